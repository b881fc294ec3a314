//! RPC client decorator that records every call into [`ChainMetrics`].

use crate::{RpcClient, RpcError, RpcRequest};
use async_trait::async_trait;
use chain_metrics::ChainMetrics;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRpcClient {
	inner: Arc<dyn RpcClient>,
	metrics: Arc<dyn ChainMetrics>,
}

impl MetricsRpcClient {
	pub fn new(inner: Arc<dyn RpcClient>, metrics: Arc<dyn ChainMetrics>) -> Self {
		Self { inner, metrics }
	}
}

#[async_trait]
impl RpcClient for MetricsRpcClient {
	async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		let started = Instant::now();
		let result = self.inner.call(method, params).await;
		self.metrics
			.record_rpc_call(method, started.elapsed(), result.is_ok());
		result
	}

	/// Each item is recorded with an equal share of the batch duration and
	/// its own outcome.
	async fn call_batch(
		&self,
		requests: &[RpcRequest],
	) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
		let started = Instant::now();
		let result = self.inner.call_batch(requests).await;
		let elapsed = started.elapsed();
		let share = elapsed / u32::try_from(requests.len().max(1)).unwrap_or(u32::MAX);

		match &result {
			Ok(items) => {
				for (request, item) in requests.iter().zip(items) {
					self.metrics
						.record_rpc_call(&request.method, share, item.is_ok());
				}
			},
			Err(_) => {
				for request in requests {
					self.metrics.record_rpc_call(&request.method, share, false);
				}
			},
		}

		result
	}

	async fn close(&self) {
		self.inner.close().await
	}
}
