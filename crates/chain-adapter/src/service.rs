//! Routes lifecycle calls to the adapter serving a chain and records
//! operation metrics.

use crate::{AdapterError, ChainAdapter, FeeStream, StatusStream};
use chain_metrics::{ChainMetrics, HealthStatus, Operation};
use chain_types::{
	BroadcastReceipt, CancelSignal, Capabilities, DerivedAddress, FeeEstimate, KeySource,
	SignedTransaction, Signer, TransactionRequest, TransactionStatus, UnsignedTransaction,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Adapters keyed by chain id, sharing one metrics instance.
pub struct AdapterService {
	adapters: HashMap<String, Arc<dyn ChainAdapter>>,
	metrics: Arc<dyn ChainMetrics>,
}

impl AdapterService {
	pub fn new(metrics: Arc<dyn ChainMetrics>) -> Self {
		Self {
			adapters: HashMap::new(),
			metrics,
		}
	}

	/// Registers `adapter` under its own chain id, replacing any previous
	/// adapter for that chain.
	pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
		let chain_id = adapter.chain_id().to_string();
		if self.adapters.insert(chain_id.clone(), adapter).is_some() {
			tracing::warn!(chain_id = %chain_id, "Replaced existing adapter");
		}
	}

	pub fn adapter(&self, chain_id: &str) -> Result<&Arc<dyn ChainAdapter>, AdapterError> {
		self.adapters.get(chain_id).ok_or_else(|| {
			AdapterError::Configuration(format!("no adapter configured for chain {}", chain_id))
		})
	}

	/// Configured chain ids, sorted.
	pub fn chains(&self) -> Vec<String> {
		let mut chains: Vec<_> = self.adapters.keys().cloned().collect();
		chains.sort();
		chains
	}

	pub fn metrics(&self) -> &Arc<dyn ChainMetrics> {
		&self.metrics
	}

	pub fn capabilities(&self, chain_id: &str) -> Result<Capabilities, AdapterError> {
		Ok(self.adapter(chain_id)?.capabilities())
	}

	pub async fn derive(
		&self,
		chain_id: &str,
		key_source: &dyn KeySource,
		path: &str,
	) -> Result<DerivedAddress, AdapterError> {
		self.adapter(chain_id)?.derive(key_source, path).await
	}

	pub async fn build(
		&self,
		chain_id: &str,
		request: &TransactionRequest,
	) -> Result<UnsignedTransaction, AdapterError> {
		let adapter = self.adapter(chain_id)?;
		self.timed(chain_id, Operation::Build, adapter.build(request))
			.await
	}

	pub async fn estimate(
		&self,
		chain_id: &str,
		request: &TransactionRequest,
	) -> Result<FeeEstimate, AdapterError> {
		self.adapter(chain_id)?.estimate(request).await
	}

	pub async fn sign(
		&self,
		unsigned: &UnsignedTransaction,
		signer: &dyn Signer,
	) -> Result<SignedTransaction, AdapterError> {
		let chain_id = unsigned.chain_id.as_str();
		let adapter = self.adapter(chain_id)?;
		self.timed(chain_id, Operation::Sign, adapter.sign(unsigned, signer))
			.await
	}

	pub async fn broadcast(
		&self,
		signed: &SignedTransaction,
	) -> Result<BroadcastReceipt, AdapterError> {
		let chain_id = signed.chain_id();
		let adapter = self.adapter(chain_id)?;
		self.timed(chain_id, Operation::Broadcast, adapter.broadcast(signed))
			.await
	}

	pub async fn query_status(
		&self,
		chain_id: &str,
		tx_hash: &str,
	) -> Result<TransactionStatus, AdapterError> {
		self.adapter(chain_id)?.query_status(tx_hash).await
	}

	pub async fn subscribe_status(
		&self,
		chain_id: &str,
		tx_hash: &str,
		cancel: CancelSignal,
	) -> Result<StatusStream, AdapterError> {
		self.adapter(chain_id)?.subscribe_status(tx_hash, cancel).await
	}

	pub async fn subscribe_fee_updates(
		&self,
		chain_id: &str,
		request: &TransactionRequest,
		interval: Duration,
		cancel: CancelSignal,
	) -> Result<FeeStream, AdapterError> {
		self.adapter(chain_id)?
			.subscribe_fee_updates(request, interval, cancel)
			.await
	}

	pub fn health(&self) -> HealthStatus {
		self.metrics.get_health_status()
	}

	/// Prometheus text exposition of everything recorded so far.
	pub fn export_metrics(&self) -> String {
		self.metrics.export()
	}

	async fn timed<T, F>(
		&self,
		chain_id: &str,
		operation: Operation,
		fut: F,
	) -> Result<T, AdapterError>
	where
		F: Future<Output = Result<T, AdapterError>>,
	{
		let started = Instant::now();
		let result = fut.await;
		let elapsed = started.elapsed();
		self.metrics
			.record_operation(chain_id, operation, elapsed, result.is_ok());

		if let Err(err) = &result {
			tracing::warn!(
				chain_id = %chain_id,
				operation = operation.as_str(),
				code = err.code().as_str(),
				error = %err,
				"Operation failed"
			);
		}
		result
	}
}
