//! JSON-RPC transport for chain nodes.
//!
//! Everything above this crate talks to a node through the [`RpcClient`]
//! trait and never through a concrete transport. The HTTP implementation
//! spreads calls over several endpoints and skips endpoints whose circuit
//! breaker is open; the metrics wrapper records every call; the mock client
//! replays scripted answers in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod health;

pub mod implementations {
	pub mod http;
	pub mod metrics;
	#[cfg(any(test, feature = "testing"))]
	pub mod mock;
}

pub use health::{EndpointHealth, EndpointHealthTracker};
pub use implementations::http::{HttpRpcClient, HttpRpcConfig};
pub use implementations::metrics::MetricsRpcClient;
#[cfg(any(test, feature = "testing"))]
pub use implementations::mock::MockRpcClient;

/// Errors returned by RPC clients.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
	/// The request never produced a response (connect, TLS, I/O).
	#[error("Transport error: {0}")]
	Transport(String),
	/// The endpoint answered with a non-200 HTTP status.
	#[error("HTTP status {status}: {body}")]
	Status { status: u16, body: String },
	/// The node answered with a JSON-RPC error object.
	#[error("JSON-RPC error {code}: {message}")]
	Rpc { code: i64, message: String },
	/// The response body was not valid JSON-RPC.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The client has no answer configured for this method.
	#[error("No response configured for method: {0}")]
	Unconfigured(String),
	/// The request exceeded the client's timeout.
	#[error("Request timed out: {0}")]
	Timeout(String),
	/// Every endpoint was tried or none exist.
	#[error("No RPC endpoint available")]
	NoEndpoints,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl RpcError {
	/// Whether the failure says nothing about the request itself, so
	/// another endpoint may succeed.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			RpcError::Transport(_)
				| RpcError::Status { .. }
				| RpcError::Decode(_)
				| RpcError::Timeout(_)
		)
	}

	/// Message from a node-side error, if this is one.
	pub fn node_message(&self) -> Option<&str> {
		match self {
			RpcError::Rpc { message, .. } => Some(message),
			_ => None,
		}
	}
}

/// One method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
	pub method: String,
	pub params: Value,
}

impl RpcRequest {
	pub fn new(method: impl Into<String>, params: Value) -> Self {
		Self {
			method: method.into(),
			params,
		}
	}
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
	pub jsonrpc: &'static str,
	pub id: u64,
	pub method: &'a str,
	pub params: &'a Value,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
	#[serde(default)]
	pub id: Value,
	#[serde(default)]
	pub result: Value,
	#[serde(default)]
	pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
	pub fn into_result(self) -> Result<Value, RpcError> {
		match self.error {
			Some(err) => Err(RpcError::Rpc {
				code: err.code,
				message: err.message,
			}),
			None => Ok(self.result),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
	pub code: i64,
	pub message: String,
	#[serde(default)]
	pub data: Option<Value>,
}

/// Request/response access to a chain node.
///
/// Calls are single attempts: a failure is returned to the caller rather
/// than retried behind its back. Deadlines are applied by the caller by
/// wrapping the returned future.
#[async_trait]
pub trait RpcClient: Send + Sync {
	/// Invokes `method` and returns its raw `result`.
	async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;

	/// Invokes several methods in one round trip.
	///
	/// The outer error means the whole batch failed. Otherwise the inner
	/// results line up with `requests`, and a failed item does not affect
	/// the others.
	async fn call_batch(
		&self,
		requests: &[RpcRequest],
	) -> Result<Vec<Result<Value, RpcError>>, RpcError>;

	/// Releases connections. Later calls fail.
	async fn close(&self) {}
}
