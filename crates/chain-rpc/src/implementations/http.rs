//! JSON-RPC over HTTP with multi-endpoint failover.

use crate::health::EndpointHealthTracker;
use crate::{JsonRpcRequest, JsonRpcResponse, RpcClient, RpcError, RpcRequest};
use async_trait::async_trait;
use chain_types::SecretString;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct HttpRpcConfig {
	pub endpoints: Vec<String>,
	/// Per-request timeout.
	pub timeout: Duration,
	/// Sent as a bearer token when set.
	pub auth_token: Option<SecretString>,
}

impl HttpRpcConfig {
	pub fn new(endpoints: Vec<String>) -> Self {
		Self {
			endpoints,
			timeout: Duration::from_secs(30),
			auth_token: None,
		}
	}
}

/// HTTP JSON-RPC client.
///
/// Endpoints are used round-robin, skipping those whose circuit is open.
/// A transport failure moves on to the next endpoint; each endpoint is
/// tried at most once per call. An error object from the node is a valid
/// answer and is returned without failing over.
pub struct HttpRpcClient {
	endpoints: Vec<String>,
	cursor: AtomicUsize,
	request_id: AtomicU64,
	health: Arc<EndpointHealthTracker>,
	http: reqwest::Client,
	auth_token: Option<SecretString>,
	closed: AtomicBool,
}

enum Payload<'a> {
	Single(JsonRpcRequest<'a>),
	Batch(Vec<JsonRpcRequest<'a>>),
}

impl HttpRpcClient {
	pub fn new(config: HttpRpcConfig) -> Result<Self, RpcError> {
		Self::with_health_tracker(config, Arc::new(EndpointHealthTracker::new()))
	}

	pub fn with_health_tracker(
		config: HttpRpcConfig,
		health: Arc<EndpointHealthTracker>,
	) -> Result<Self, RpcError> {
		if config.endpoints.is_empty() {
			return Err(RpcError::Configuration(
				"at least one RPC endpoint is required".into(),
			));
		}

		let http = reqwest::Client::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| RpcError::Configuration(format!("failed to build HTTP client: {}", e)))?;

		Ok(Self {
			endpoints: config.endpoints,
			cursor: AtomicUsize::new(0),
			request_id: AtomicU64::new(0),
			health,
			http,
			auth_token: config.auth_token,
			closed: AtomicBool::new(false),
		})
	}

	pub fn health_tracker(&self) -> &Arc<EndpointHealthTracker> {
		&self.health
	}

	pub fn endpoints(&self) -> &[String] {
		&self.endpoints
	}

	fn next_id(&self) -> u64 {
		self.request_id.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// Next endpoint not yet attempted, preferring closed circuits.
	fn select_endpoint(&self, attempted: &HashSet<usize>) -> Option<usize> {
		let n = self.endpoints.len();
		let start = self.cursor.load(Ordering::Relaxed);

		for i in 0..n {
			let idx = (start + i) % n;
			if attempted.contains(&idx) {
				continue;
			}
			if self.health.is_healthy(&self.endpoints[idx]) {
				self.cursor.store((idx + 1) % n, Ordering::Relaxed);
				return Some(idx);
			}
		}

		(0..n).find(|idx| !attempted.contains(idx))
	}

	fn ensure_open(&self) -> Result<(), RpcError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(RpcError::Configuration("client is closed".into()));
		}
		Ok(())
	}

	/// Posts one payload to one endpoint and returns the raw body.
	async fn post(&self, endpoint: &str, payload: &Payload<'_>) -> Result<Vec<u8>, RpcError> {
		let mut request = self.http.post(endpoint);
		request = match payload {
			Payload::Single(req) => request.json(req),
			Payload::Batch(reqs) => request.json(reqs),
		};
		if let Some(token) = &self.auth_token {
			request = request.bearer_auth(token.expose());
		}

		let response = request.send().await.map_err(map_reqwest_error)?;
		let status = response.status();
		let body = response.bytes().await.map_err(map_reqwest_error)?;

		if status != reqwest::StatusCode::OK {
			return Err(RpcError::Status {
				status: status.as_u16(),
				body: String::from_utf8_lossy(&body).chars().take(256).collect(),
			});
		}

		Ok(body.to_vec())
	}

	/// Runs `attempt` against endpoints until one answers at the transport
	/// level. Records health for every attempt.
	async fn with_failover<T, F, Fut>(&self, label: &str, attempt: F) -> Result<T, RpcError>
	where
		F: Fn(String) -> Fut,
		Fut: std::future::Future<Output = Result<T, RpcError>>,
	{
		self.ensure_open()?;

		let mut attempted = HashSet::new();
		let mut last_error = RpcError::NoEndpoints;

		while let Some(idx) = self.select_endpoint(&attempted) {
			attempted.insert(idx);
			let endpoint = self.endpoints[idx].clone();
			let started = Instant::now();

			match attempt(endpoint.clone()).await {
				Err(e) if e.is_transport() => {
					self.health.record_failure(&endpoint, &e.to_string());
					tracing::warn!(
						endpoint = %endpoint,
						method = %label,
						error = %e,
						"RPC endpoint failed, trying next"
					);
					last_error = e;
				},
				outcome => {
					self.health.record_success(&endpoint, started.elapsed());
					return outcome;
				},
			}
		}

		tracing::error!(method = %label, error = %last_error, "All RPC endpoints failed");
		Err(last_error)
	}
}

fn map_reqwest_error(e: reqwest::Error) -> RpcError {
	if e.is_timeout() {
		RpcError::Timeout(e.to_string())
	} else {
		RpcError::Transport(e.to_string())
	}
}

#[async_trait]
impl RpcClient for HttpRpcClient {
	async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.with_failover(method, |endpoint| {
			let params = &params;
			async move {
				let id = self.next_id();
				let payload = Payload::Single(JsonRpcRequest {
					jsonrpc: "2.0",
					id,
					method,
					params,
				});
				tracing::debug!(endpoint = %endpoint, method = %method, id, "RPC call");
				let body = self.post(&endpoint, &payload).await?;
				let response: JsonRpcResponse = serde_json::from_slice(&body)
					.map_err(|e| RpcError::Decode(format!("invalid JSON-RPC response: {}", e)))?;
				response.into_result()
			}
		})
		.await
	}

	async fn call_batch(
		&self,
		requests: &[RpcRequest],
	) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
		if requests.is_empty() {
			return Ok(Vec::new());
		}

		self.with_failover("batch", |endpoint| async move {
			let ids: Vec<u64> = requests.iter().map(|_| self.next_id()).collect();
			let payload = Payload::Batch(
				requests
					.iter()
					.zip(&ids)
					.map(|(r, id)| JsonRpcRequest {
						jsonrpc: "2.0",
						id: *id,
						method: &r.method,
						params: &r.params,
					})
					.collect(),
			);
			tracing::debug!(endpoint = %endpoint, size = requests.len(), "RPC batch");

			let body = self.post(&endpoint, &payload).await?;
			let responses: Vec<JsonRpcResponse> = serde_json::from_slice(&body)
				.map_err(|e| RpcError::Decode(format!("invalid JSON-RPC batch response: {}", e)))?;

			let mut by_id: HashMap<u64, JsonRpcResponse> = responses
				.into_iter()
				.filter_map(|r| r.id.as_u64().map(|id| (id, r)))
				.collect();

			Ok(ids
				.iter()
				.map(|id| match by_id.remove(id) {
					Some(response) => response.into_result(),
					None => Err(RpcError::Decode(format!("missing response for id {}", id))),
				})
				.collect())
		})
		.await
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{extract::State, routing::post, Json, Router};
	use serde_json::json;
	use std::sync::atomic::AtomicUsize;

	/// Answers every request with its method name, except `fail` which
	/// produces a JSON-RPC error. Batch responses come back reversed.
	async fn echo(State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>) -> Json<Value> {
		hits.fetch_add(1, Ordering::SeqCst);
		let answer = |req: &Value| {
			let method = req["method"].as_str().unwrap_or_default();
			if method == "fail" {
				json!({"jsonrpc": "2.0", "id": req["id"], "error": {"code": -32000, "message": "boom"}})
			} else {
				json!({"jsonrpc": "2.0", "id": req["id"], "result": method})
			}
		};
		match body {
			Value::Array(items) => Json(Value::Array(items.iter().rev().map(answer).collect())),
			single => Json(answer(&single)),
		}
	}

	async fn spawn_node() -> (String, Arc<AtomicUsize>) {
		let hits = Arc::new(AtomicUsize::new(0));
		let app = Router::new().route("/", post(echo)).with_state(hits.clone());
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		(format!("http://{}/", addr), hits)
	}

	fn client(endpoints: Vec<String>) -> HttpRpcClient {
		let mut config = HttpRpcConfig::new(endpoints);
		config.timeout = Duration::from_secs(2);
		HttpRpcClient::new(config).unwrap()
	}

	#[test]
	fn test_requires_an_endpoint() {
		assert!(matches!(
			HttpRpcClient::new(HttpRpcConfig::new(vec![])),
			Err(RpcError::Configuration(_))
		));
	}

	#[tokio::test]
	async fn test_call_and_request_ids() {
		let (url, _) = spawn_node().await;
		let client = client(vec![url]);

		assert_eq!(client.call("eth_blockNumber", json!([])).await.unwrap(), json!("eth_blockNumber"));
		client.call("eth_chainId", json!([])).await.unwrap();
		assert_eq!(client.request_id.load(Ordering::Relaxed), 2);
	}

	#[tokio::test]
	async fn test_fails_over_on_transport_error() {
		let (url, hits) = spawn_node().await;
		let dead = "http://127.0.0.1:1/".to_string();
		let client = client(vec![dead.clone(), url.clone()]);

		let result = client.call("getblockcount", json!([])).await.unwrap();
		assert_eq!(result, json!("getblockcount"));
		assert_eq!(hits.load(Ordering::SeqCst), 1);
		assert_eq!(client.health_tracker().health(&dead).failed_calls, 1);
		assert_eq!(client.health_tracker().health(&url).successful_calls, 1);
	}

	#[tokio::test]
	async fn test_rpc_error_does_not_fail_over() {
		let (first, first_hits) = spawn_node().await;
		let (second, second_hits) = spawn_node().await;
		let client = client(vec![first.clone(), second]);

		let err = client.call("fail", json!([])).await.unwrap_err();
		assert_eq!(
			err,
			RpcError::Rpc {
				code: -32000,
				message: "boom".into()
			}
		);
		assert_eq!(first_hits.load(Ordering::SeqCst), 1);
		assert_eq!(second_hits.load(Ordering::SeqCst), 0);
		assert_eq!(client.health_tracker().health(&first).successful_calls, 1);
	}

	#[tokio::test]
	async fn test_all_endpoints_down() {
		let client = client(vec!["http://127.0.0.1:1/".into(), "http://127.0.0.1:2/".into()]);
		let err = client.call("eth_blockNumber", json!([])).await.unwrap_err();
		assert!(err.is_transport());
	}

	#[tokio::test]
	async fn test_batch_matches_ids() {
		let (url, hits) = spawn_node().await;
		let client = client(vec![url]);

		let requests = vec![
			RpcRequest::new("a", json!([])),
			RpcRequest::new("fail", json!([])),
			RpcRequest::new("c", json!([])),
		];
		let results = client.call_batch(&requests).await.unwrap();
		assert_eq!(results.len(), 3);
		assert_eq!(results[0], Ok(json!("a")));
		assert!(matches!(results[1], Err(RpcError::Rpc { .. })));
		assert_eq!(results[2], Ok(json!("c")));

		assert!(client.call_batch(&[]).await.unwrap().is_empty());
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_closed_client_rejects_calls() {
		let (url, _) = spawn_node().await;
		let client = client(vec![url]);
		client.close().await;
		assert!(matches!(
			client.call("eth_blockNumber", json!([])).await,
			Err(RpcError::Configuration(_))
		));
	}
}
