//! Scripted RPC client for tests.

use crate::{RpcClient, RpcError, RpcRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Script {
	queued: HashMap<String, VecDeque<Result<Value, RpcError>>>,
	responses: HashMap<String, Value>,
	errors: HashMap<String, RpcError>,
	calls: HashMap<String, usize>,
	params: HashMap<String, Vec<Value>>,
	delay: Option<Duration>,
}

/// Answers calls from a per-method script.
///
/// Lookup order for a method: the next queued answer, then a fixed error,
/// then a fixed response. A method with none of these fails with
/// [`RpcError::Unconfigured`].
#[derive(Default)]
pub struct MockRpcClient {
	script: Mutex<Script>,
}

impl MockRpcClient {
	pub fn new() -> Self {
		Self::default()
	}

	fn script(&self) -> std::sync::MutexGuard<'_, Script> {
		// A panicking test thread must not poison the others.
		self.script.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn set_response(&self, method: &str, value: Value) {
		let mut s = self.script();
		s.errors.remove(method);
		s.responses.insert(method.to_string(), value);
	}

	pub fn set_error(&self, method: &str, error: RpcError) {
		self.script().errors.insert(method.to_string(), error);
	}

	pub fn clear_error(&self, method: &str) {
		self.script().errors.remove(method);
	}

	/// Queues a one-shot answer consumed before the fixed ones.
	pub fn push_response(&self, method: &str, result: Result<Value, RpcError>) {
		self.script()
			.queued
			.entry(method.to_string())
			.or_default()
			.push_back(result);
	}

	/// Delays every answer, which lets tests overlap concurrent calls.
	pub fn set_delay(&self, delay: Duration) {
		self.script().delay = Some(delay);
	}

	pub fn call_count(&self, method: &str) -> usize {
		self.script().calls.get(method).copied().unwrap_or(0)
	}

	/// Parameters of every call to `method`, oldest first.
	pub fn params(&self, method: &str) -> Vec<Value> {
		self.script().params.get(method).cloned().unwrap_or_default()
	}

	pub fn reset(&self) {
		*self.script() = Script::default();
	}

	fn answer(&self, method: &str, params: Value) -> (Result<Value, RpcError>, Option<Duration>) {
		let mut s = self.script();
		*s.calls.entry(method.to_string()).or_default() += 1;
		s.params.entry(method.to_string()).or_default().push(params);

		let result = if let Some(queued) = s.queued.get_mut(method).and_then(|q| q.pop_front()) {
			queued
		} else if let Some(err) = s.errors.get(method) {
			Err(err.clone())
		} else if let Some(value) = s.responses.get(method) {
			Ok(value.clone())
		} else {
			Err(RpcError::Unconfigured(method.to_string()))
		};
		(result, s.delay)
	}
}

#[async_trait]
impl RpcClient for MockRpcClient {
	async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		let (result, delay) = self.answer(method, params);
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		result
	}

	async fn call_batch(
		&self,
		requests: &[RpcRequest],
	) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
		let mut results = Vec::with_capacity(requests.len());
		for request in requests {
			results.push(self.call(&request.method, request.params.clone()).await);
		}
		Ok(results)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn test_script_order() {
		let mock = MockRpcClient::new();
		mock.set_response("m", json!(1));
		mock.push_response("m", Ok(json!(0)));

		assert_eq!(mock.call("m", json!([])).await.unwrap(), json!(0));
		assert_eq!(mock.call("m", json!([])).await.unwrap(), json!(1));

		mock.set_error("m", RpcError::Timeout("slow".into()));
		assert!(mock.call("m", json!([])).await.is_err());
		assert_eq!(mock.call_count("m"), 3);

		assert!(matches!(
			mock.call("other", json!([1])).await,
			Err(RpcError::Unconfigured(_))
		));
		assert_eq!(mock.params("other"), vec![json!([1])]);

		mock.reset();
		assert_eq!(mock.call_count("m"), 0);
	}
}
