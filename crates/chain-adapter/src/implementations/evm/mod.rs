//! Account-style adapter for Ethereum networks.
//!
//! Transactions are EIP-1559. The signing payload is the transaction's
//! signature hash, which doubles as its id and as the broadcast hash, so a
//! request built twice against the same node state yields the same hash.

use crate::broadcast::Broadcaster;
use crate::derivation::{self, Bip44Path, COIN_TYPE_ETHEREUM};
use crate::settings;
use crate::signing::preflight;
use crate::subscription::{fee_stream, status_stream, PollSchedule};
use crate::{AdapterError, AdapterRegistry, ChainAdapter, FeeEstimator, FeeStream, StatusStream};
use async_trait::async_trait;
use chain_metrics::ChainMetrics;
use chain_rpc::RpcClient;
use chain_storage::TransactionStateStore;
use chain_types::capabilities::INTERFACE_VERSION;
use chain_types::{
	parse_quantity_u64, truncate_id, BroadcastReceipt, CancelSignal, Capabilities, ConfigSchema,
	DerivedAddress, ErrorCode, FeeEstimate, KeySource, SignedTransaction, Signer,
	TransactionRequest, TransactionStatus, TxStatus, UnsignedTransaction, ValidationError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod address;
pub mod builder;
pub mod fee;
mod rpc;

use address::{checksummed_address, same_address, ADDRESS_FORMAT};
use builder::TxParams;
use fee::{EvmFeeEstimator, TRANSFER_GAS};
use rpc::EvmRpc;

/// Confirmations after which a transaction counts as final.
pub const MIN_CONFIRMATIONS: u64 = 12;

/// Roughly one block.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

const ERROR_BACKOFF_INITIAL: Duration = Duration::from_secs(3);

/// Headroom added on top of the node's gas estimate, in percent.
const GAS_HEADROOM_PCT: u64 = 110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmNetwork {
	Mainnet,
	Goerli,
	Sepolia,
}

impl EvmNetwork {
	pub fn from_chain_id(chain_id: &str) -> Option<Self> {
		match chain_id {
			"ethereum" => Some(EvmNetwork::Mainnet),
			"ethereum-goerli" => Some(EvmNetwork::Goerli),
			"ethereum-sepolia" => Some(EvmNetwork::Sepolia),
			_ => None,
		}
	}

	pub fn chain_id(&self) -> &'static str {
		match self {
			EvmNetwork::Mainnet => "ethereum",
			EvmNetwork::Goerli => "ethereum-goerli",
			EvmNetwork::Sepolia => "ethereum-sepolia",
		}
	}

	/// EIP-155 network id.
	pub fn network_id(&self) -> u64 {
		match self {
			EvmNetwork::Mainnet => 1,
			EvmNetwork::Goerli => 5,
			EvmNetwork::Sepolia => 11_155_111,
		}
	}
}

#[derive(Clone)]
pub struct EvmAdapter {
	network: EvmNetwork,
	rpc: EvmRpc,
	fees: EvmFeeEstimator,
	broadcaster: Arc<Broadcaster>,
	schedule: PollSchedule,
}

impl EvmAdapter {
	pub fn new(
		network: EvmNetwork,
		client: Arc<dyn RpcClient>,
		store: Arc<dyn TransactionStateStore>,
	) -> Self {
		let rpc = EvmRpc::new(client);
		Self {
			network,
			fees: EvmFeeEstimator::new(network.chain_id(), rpc.clone()),
			rpc,
			broadcaster: Arc::new(Broadcaster::new(network.chain_id(), store)),
			schedule: PollSchedule::new(DEFAULT_POLL_INTERVAL, ERROR_BACKOFF_INITIAL),
		}
	}

	/// Replaces the status poll interval. Error backoff is unaffected.
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.schedule.interval = interval;
		self
	}

	pub fn network(&self) -> EvmNetwork {
		self.network
	}

	pub fn fee_estimator(&self) -> &EvmFeeEstimator {
		&self.fees
	}

	/// Node estimate plus headroom, or a plain transfer when the node
	/// cannot estimate.
	async fn gas_limit(&self, request: &TransactionRequest) -> u64 {
		let data = request.memo().map(str::as_bytes).unwrap_or_default();
		let estimate = self
			.rpc
			.estimate_gas(&request.from, &request.to, request.amount, data)
			.await
			.unwrap_or_else(|err| {
				tracing::debug!(error = %err, "Gas estimation failed, assuming a plain transfer");
				TRANSFER_GAS
			});
		estimate.saturating_mul(GAS_HEADROOM_PCT) / 100
	}

	async fn classify(&self, tx_hash: &str) -> Result<TransactionStatus, AdapterError> {
		if self.rpc.transaction(tx_hash).await?.is_none() {
			return Err(AdapterError::TxNotFound(tx_hash.to_string()));
		}

		let Some(receipt) = self.rpc.receipt(tx_hash).await? else {
			return Ok(TransactionStatus::pending(tx_hash));
		};

		let mut status = TransactionStatus {
			block_hash: receipt.block_hash.clone(),
			..TransactionStatus::pending(tx_hash)
		};

		if receipt.status.as_deref() == Some("0x0") {
			status.status = TxStatus::Failed;
			status.error = Some(format!(
				"{}: Transaction reverted",
				ErrorCode::TxReverted.as_str()
			));
			return Ok(status);
		}

		let mined_in = receipt.block_number.as_deref().and_then(parse_quantity_u64);
		match (mined_in, self.rpc.block_number().await) {
			(Some(block), Ok(head)) => {
				status.confirmations = head.saturating_sub(block);
				status.block_number = Some(block);
				status.status = if status.confirmations >= MIN_CONFIRMATIONS {
					TxStatus::Finalized
				} else {
					TxStatus::Confirmed
				};
			},
			(_, head) => {
				if let Err(err) = head {
					tracing::debug!(error = %err, "Head block unavailable, reporting one confirmation");
				}
				status.status = TxStatus::Confirmed;
				status.confirmations = 1;
			},
		}
		Ok(status)
	}
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
	fn chain_id(&self) -> &str {
		self.network.chain_id()
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			chain_id: self.network.chain_id().to_string(),
			interface_version: INTERFACE_VERSION.to_string(),
			supports_eip1559: true,
			supports_memo: true,
			supports_multisig: true,
			supports_fee_delegation: true,
			supports_websocket: true,
			supports_rbf: false,
			max_memo_length: 0,
			min_confirmations: MIN_CONFIRMATIONS,
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EvmAdapterSchema)
	}

	#[instrument(skip_all, fields(path = %path))]
	async fn derive(
		&self,
		key_source: &dyn KeySource,
		path: &str,
	) -> Result<DerivedAddress, AdapterError> {
		let parsed = Bip44Path::parse(path, COIN_TYPE_ETHEREUM)?;
		let public_key = derivation::public_key(key_source, path).await?;
		let address = checksummed_address(&public_key).map_err(|reason| {
			AdapterError::validation(
				ErrorCode::InvalidAddress,
				format!("key source returned an unusable public key: {}", reason),
			)
		})?;

		Ok(DerivedAddress {
			address,
			chain_id: self.chain_id().to_string(),
			derivation_path: parsed.to_string(),
			public_key,
			format: ADDRESS_FORMAT.to_string(),
		})
	}

	#[instrument(skip_all, fields(to = %truncate_id(&request.to)))]
	async fn build(
		&self,
		request: &TransactionRequest,
	) -> Result<UnsignedTransaction, AdapterError> {
		let to = builder::validate(request)?;
		let nonce = self.rpc.transaction_count(&request.from).await?;
		let gas_limit = match request.options.gas_limit {
			Some(limit) => limit,
			None => self.gas_limit(request).await,
		};
		let fees = self.fees.fee_params(request.fee_speed).await;

		let unsigned = builder::assemble(
			self.chain_id(),
			request,
			to,
			TxParams {
				network_id: self.network.network_id(),
				nonce,
				gas_limit,
				fees,
			},
		);
		tracing::info!(
			tx_id = %truncate_id(&unsigned.id),
			nonce,
			gas_limit,
			"Built transaction"
		);
		Ok(unsigned)
	}

	async fn estimate(&self, request: &TransactionRequest) -> Result<FeeEstimate, AdapterError> {
		Ok(match request.options.gas_limit {
			Some(limit) => self.fees.estimate_with_gas_limit(request, limit).await,
			None => FeeEstimator::estimate(&self.fees, request).await,
		})
	}

	#[instrument(skip_all, fields(tx_id = %truncate_id(&unsigned.id)))]
	async fn sign(
		&self,
		unsigned: &UnsignedTransaction,
		signer: &dyn Signer,
	) -> Result<SignedTransaction, AdapterError> {
		preflight(unsigned, signer, self.chain_id(), same_address)?;

		let signature = signer.sign(&unsigned.signing_payload).await?;
		if signature.is_empty() {
			return Err(AdapterError::validation(
				ErrorCode::InvalidSignature,
				"signer returned an empty signature",
			));
		}

		let mut serialized = unsigned.signing_payload.clone();
		serialized.extend_from_slice(&signature);

		Ok(SignedTransaction::new(
			unsigned.clone(),
			signature,
			unsigned.from.clone(),
			unsigned.id.clone(),
			serialized,
		))
	}

	#[instrument(skip_all, fields(tx_hash = %truncate_id(&signed.tx_hash)))]
	async fn broadcast(&self, signed: &SignedTransaction) -> Result<BroadcastReceipt, AdapterError> {
		self.broadcaster
			.broadcast(signed, || self.rpc.send_raw_transaction(&signed.serialized_tx))
			.await
	}

	#[instrument(skip_all, fields(tx_hash = %truncate_id(tx_hash)))]
	async fn query_status(&self, tx_hash: &str) -> Result<TransactionStatus, AdapterError> {
		let status = self.classify(tx_hash).await?;
		if let Err(err) = self.broadcaster.reconcile(&status).await {
			tracing::warn!(error = %err, "Failed to reconcile transaction state");
		}
		Ok(status)
	}

	async fn subscribe_status(
		&self,
		tx_hash: &str,
		cancel: CancelSignal,
	) -> Result<StatusStream, AdapterError> {
		let initial = self.query_status(tx_hash).await?;
		let adapter = self.clone();
		let hash = tx_hash.to_string();

		Ok(status_stream(
			tx_hash.to_string(),
			initial,
			cancel,
			self.schedule,
			move || {
				let adapter = adapter.clone();
				let hash = hash.clone();
				async move { adapter.query_status(&hash).await }
			},
		))
	}

	/// Re-estimates only once a new block has been produced.
	async fn subscribe_fee_updates(
		&self,
		request: &TransactionRequest,
		interval: Duration,
		cancel: CancelSignal,
	) -> Result<FeeStream, AdapterError> {
		let first = self.estimate(request).await?;
		let last_block = Arc::new(AtomicU64::new(self.rpc.block_number().await.unwrap_or(0)));
		let adapter = self.clone();
		let request = request.clone();

		Ok(fee_stream(first, cancel, interval, move || {
			let adapter = adapter.clone();
			let request = request.clone();
			let last_block = last_block.clone();
			async move {
				match adapter.rpc.block_number().await {
					Ok(head) if head > last_block.load(Ordering::Relaxed) => {
						last_block.store(head, Ordering::Relaxed);
						adapter.estimate(&request).await.ok()
					},
					Ok(_) => None,
					Err(err) => {
						tracing::debug!(error = %err, "Head block unavailable, skipping fee update");
						None
					},
				}
			}
		}))
	}
}

/// Configuration schema for EVM chain sections.
pub struct EvmAdapterSchema;

impl ConfigSchema for EvmAdapterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		settings::schema(&["evm"]).validate(config)
	}
}

/// Builds an EVM adapter for `chain_id` from its `[chains.<id>]` section.
///
/// Required: `rpc_urls`. Optional: `request_timeout_ms`,
/// `poll_interval_seconds`, `auth_token`.
pub fn create_adapter(
	chain_id: &str,
	config: &toml::Value,
	store: Arc<dyn TransactionStateStore>,
	metrics: Arc<dyn ChainMetrics>,
) -> Result<Box<dyn ChainAdapter>, AdapterError> {
	EvmAdapterSchema
		.validate(config)
		.map_err(|e| AdapterError::Configuration(format!("chains.{}: {}", chain_id, e)))?;

	let network = EvmNetwork::from_chain_id(chain_id).ok_or_else(|| {
		AdapterError::Configuration(format!("unknown EVM chain: {}", chain_id))
	})?;
	let settings = settings::parse(config)?;
	let client = settings::rpc_client(&settings, metrics)?;

	let mut adapter = EvmAdapter::new(network, client, store);
	if let Some(interval) = settings.poll_interval {
		adapter = adapter.with_poll_interval(interval);
	}

	tracing::info!(
		chain_id = %chain_id,
		network_id = network.network_id(),
		endpoints = settings.rpc_urls.len(),
		"EVM adapter ready"
	);
	Ok(Box::new(adapter))
}

pub struct Registry;

impl chain_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm";
	type Factory = crate::AdapterFactory;

	fn factory() -> Self::Factory {
		create_adapter
	}
}

impl AdapterRegistry for Registry {}
