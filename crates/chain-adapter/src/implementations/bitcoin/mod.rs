//! UTXO-style adapter for Bitcoin networks.
//!
//! `build` selects spendable outputs of the sender in node order and
//! assembles a version 2 transaction paying the recipient, change back to
//! the sender (or `options.change_address`) and an optional OP_RETURN memo.
//! The signing payload is the consensus serialisation of that transaction;
//! its txid is both the unsigned id and the broadcast hash.

use crate::broadcast::Broadcaster;
use crate::derivation::{self, Bip44Path, COIN_TYPE_BITCOIN};
use crate::settings;
use crate::signing::preflight;
use crate::subscription::{fee_stream, status_stream, PollSchedule};
use crate::{AdapterError, AdapterRegistry, ChainAdapter, FeeEstimator, FeeStream, StatusStream};
use async_trait::async_trait;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::Network;
use chain_metrics::ChainMetrics;
use chain_rpc::RpcClient;
use chain_storage::TransactionStateStore;
use chain_types::capabilities::INTERFACE_VERSION;
use chain_types::{
	truncate_id, BroadcastReceipt, CancelSignal, Capabilities, ConfigSchema, DerivedAddress,
	ErrorCode, FeeEstimate, KeySource, SignedTransaction, Signer, TransactionRequest,
	TransactionStatus, TxStatus, UnsignedTransaction, ValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod address;
pub mod builder;
pub mod fee;
mod rpc;

use address::{p2wpkh_address, same_address, ADDRESS_FORMAT};
use builder::MAX_MEMO_BYTES;
use fee::BitcoinFeeEstimator;
use rpc::BitcoinRpc;

/// Confirmations after which a transaction counts as final.
pub const MIN_CONFIRMATIONS: u64 = 6;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const ERROR_BACKOFF_INITIAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitcoinNetwork {
	Mainnet,
	Testnet,
	Regtest,
}

impl BitcoinNetwork {
	pub fn from_chain_id(chain_id: &str) -> Option<Self> {
		match chain_id {
			"bitcoin" => Some(BitcoinNetwork::Mainnet),
			"bitcoin-testnet" => Some(BitcoinNetwork::Testnet),
			"bitcoin-regtest" => Some(BitcoinNetwork::Regtest),
			_ => None,
		}
	}

	pub fn chain_id(&self) -> &'static str {
		match self {
			BitcoinNetwork::Mainnet => "bitcoin",
			BitcoinNetwork::Testnet => "bitcoin-testnet",
			BitcoinNetwork::Regtest => "bitcoin-regtest",
		}
	}

	/// Address and consensus parameters.
	pub fn network(&self) -> Network {
		match self {
			BitcoinNetwork::Mainnet => Network::Bitcoin,
			BitcoinNetwork::Testnet => Network::Testnet,
			BitcoinNetwork::Regtest => Network::Regtest,
		}
	}
}

#[derive(Clone)]
pub struct BitcoinAdapter {
	network: BitcoinNetwork,
	rpc: BitcoinRpc,
	fees: BitcoinFeeEstimator,
	broadcaster: Arc<Broadcaster>,
	schedule: PollSchedule,
}

impl BitcoinAdapter {
	pub fn new(
		network: BitcoinNetwork,
		client: Arc<dyn RpcClient>,
		store: Arc<dyn TransactionStateStore>,
	) -> Self {
		let rpc = BitcoinRpc::new(client);
		Self {
			network,
			fees: BitcoinFeeEstimator::new(network.chain_id(), rpc.clone()),
			rpc,
			broadcaster: Arc::new(Broadcaster::new(network.chain_id(), store)),
			schedule: PollSchedule::new(DEFAULT_POLL_INTERVAL, ERROR_BACKOFF_INITIAL),
		}
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.schedule.interval = interval;
		self
	}

	pub fn network(&self) -> BitcoinNetwork {
		self.network
	}

	pub fn fee_estimator(&self) -> &BitcoinFeeEstimator {
		&self.fees
	}

	async fn classify(&self, tx_hash: &str) -> Result<TransactionStatus, AdapterError> {
		let raw = match self.rpc.raw_transaction(tx_hash).await {
			Ok(raw) => raw,
			Err(err) if is_unknown_transaction(&err) => {
				return Err(AdapterError::TxNotFound(tx_hash.to_string()));
			},
			Err(err) => return Err(err.into()),
		};

		let mut status = TransactionStatus {
			confirmations: raw.confirmations,
			block_hash: raw.blockhash.clone(),
			..TransactionStatus::pending(tx_hash)
		};
		status.status = match raw.confirmations {
			0 => TxStatus::Pending,
			n if n >= MIN_CONFIRMATIONS => TxStatus::Finalized,
			_ => TxStatus::Confirmed,
		};

		if let Some(block_hash) = raw.blockhash.as_deref() {
			match self.rpc.block_height(block_hash).await {
				Ok(height) => status.block_number = Some(height),
				Err(err) => {
					tracing::debug!(error = %err, "Block height unavailable");
				},
			}
		}
		Ok(status)
	}
}

fn is_unknown_transaction(err: &chain_rpc::RpcError) -> bool {
	err.node_message()
		.map(|m| m.contains("not found") || m.contains("No such"))
		.unwrap_or(false)
}

/// Txid of a serialised non-witness transaction, in display byte order.
fn txid_hex(serialized: &[u8]) -> String {
	let mut bytes = sha256d::Hash::hash(serialized).to_byte_array();
	bytes.reverse();
	hex::encode(bytes)
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
	fn chain_id(&self) -> &str {
		self.network.chain_id()
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			chain_id: self.network.chain_id().to_string(),
			interface_version: INTERFACE_VERSION.to_string(),
			supports_eip1559: false,
			supports_memo: true,
			supports_multisig: true,
			supports_fee_delegation: false,
			supports_websocket: true,
			supports_rbf: true,
			max_memo_length: MAX_MEMO_BYTES,
			min_confirmations: MIN_CONFIRMATIONS,
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BitcoinAdapterSchema)
	}

	#[instrument(skip_all, fields(path = %path))]
	async fn derive(
		&self,
		key_source: &dyn KeySource,
		path: &str,
	) -> Result<DerivedAddress, AdapterError> {
		let parsed = Bip44Path::parse(path, COIN_TYPE_BITCOIN)?;
		let public_key = derivation::public_key(key_source, path).await?;
		let address = p2wpkh_address(&public_key, self.network.network()).map_err(|reason| {
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
		let network = self.network.network();
		let validated = builder::validate(request, network)?;
		let utxos = self.rpc.list_unspent(&request.from).await?;
		let fee_rate = self.fees.fee_rate(request.fee_speed).await;
		let selection = builder::select_utxos(&utxos, validated.amount, fee_rate)?;

		let unsigned = builder::assemble(
			self.chain_id(),
			network,
			request,
			&validated,
			selection,
			fee_rate,
		)?;
		tracing::info!(
			tx_id = %truncate_id(&unsigned.id),
			fee_rate,
			fee = %unsigned.fee,
			"Built transaction"
		);
		Ok(unsigned)
	}

	async fn estimate(&self, request: &TransactionRequest) -> Result<FeeEstimate, AdapterError> {
		Ok(FeeEstimator::estimate(&self.fees, request).await)
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

		// Witness data is attached by the signer's wallet; the relayed bytes
		// are the payload itself, so the hash equals the unsigned txid.
		let serialized = unsigned.signing_payload.clone();
		let tx_hash = txid_hex(&serialized);

		Ok(SignedTransaction::new(
			unsigned.clone(),
			signature,
			unsigned.from.clone(),
			tx_hash,
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

	async fn subscribe_fee_updates(
		&self,
		request: &TransactionRequest,
		interval: Duration,
		cancel: CancelSignal,
	) -> Result<FeeStream, AdapterError> {
		let first = self.estimate(request).await?;
		let adapter = self.clone();
		let request = request.clone();

		Ok(fee_stream(first, cancel, interval, move || {
			let adapter = adapter.clone();
			let request = request.clone();
			async move { adapter.estimate(&request).await.ok() }
		}))
	}
}

/// Configuration schema for Bitcoin chain sections.
pub struct BitcoinAdapterSchema;

impl ConfigSchema for BitcoinAdapterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		settings::schema(&["bitcoin"]).validate(config)
	}
}

/// Builds a Bitcoin adapter for `chain_id` from its `[chains.<id>]`
/// section. Takes the same keys as the EVM family.
pub fn create_adapter(
	chain_id: &str,
	config: &toml::Value,
	store: Arc<dyn TransactionStateStore>,
	metrics: Arc<dyn ChainMetrics>,
) -> Result<Box<dyn ChainAdapter>, AdapterError> {
	BitcoinAdapterSchema
		.validate(config)
		.map_err(|e| AdapterError::Configuration(format!("chains.{}: {}", chain_id, e)))?;

	let network = BitcoinNetwork::from_chain_id(chain_id).ok_or_else(|| {
		AdapterError::Configuration(format!("unknown Bitcoin chain: {}", chain_id))
	})?;
	let settings = settings::parse(config)?;
	let client = settings::rpc_client(&settings, metrics)?;

	let mut adapter = BitcoinAdapter::new(network, client, store);
	if let Some(interval) = settings.poll_interval {
		adapter = adapter.with_poll_interval(interval);
	}

	tracing::info!(
		chain_id = %chain_id,
		network = %network.network(),
		endpoints = settings.rpc_urls.len(),
		"Bitcoin adapter ready"
	);
	Ok(Box::new(adapter))
}

pub struct Registry;

impl chain_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "bitcoin";
	type Factory = crate::AdapterFactory;

	fn factory() -> Self::Factory {
		create_adapter
	}
}

impl AdapterRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{FakeKeySource, FakeSigner};
	use alloy_primitives::U256;
	use chain_metrics::NoopMetrics;
	use chain_rpc::{MockRpcClient, RpcError};
	use chain_storage::MemoryStore;
	use chain_types::{cancellation, BuildDetails, FeeSpeed, TxState};
	use futures::StreamExt;
	use serde_json::json;

	const BLOCK_HASH: &str = "000000000000000000024bead8df69990852c202db0e0097c1a12ea637d7e96d";

	fn key_address(key_hex: &str) -> String {
		p2wpkh_address(&hex::decode(key_hex).unwrap(), Network::Bitcoin).unwrap()
	}

	fn from() -> String {
		key_address("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
	}

	fn to() -> String {
		key_address("02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5")
	}

	fn adapter() -> (BitcoinAdapter, Arc<MockRpcClient>, Arc<MemoryStore>) {
		let mock = Arc::new(MockRpcClient::new());
		let store = Arc::new(MemoryStore::new());
		(
			BitcoinAdapter::new(BitcoinNetwork::Mainnet, mock.clone(), store.clone()),
			mock,
			store,
		)
	}

	fn script_node(mock: &MockRpcClient) {
		mock.set_response(
			"listunspent",
			json!([
				{"txid": "aa".repeat(32), "vout": 0, "amount": 0.0003, "confirmations": 4, "spendable": true},
				{"txid": "bb".repeat(32), "vout": 1, "amount": 0.0005, "confirmations": 2, "spendable": true},
			]),
		);
		mock.set_response("estimatesmartfee", json!({"feerate": 0.0001, "blocks": 3}));
	}

	fn request() -> TransactionRequest {
		TransactionRequest::new(from(), to(), "BTC", U256::from(60_000u64))
	}

	fn raw_tx(confirmations: u64) -> serde_json::Value {
		if confirmations == 0 {
			json!({"confirmations": 0})
		} else {
			json!({"confirmations": confirmations, "blockhash": BLOCK_HASH})
		}
	}

	async fn signed(adapter: &BitcoinAdapter, mock: &MockRpcClient) -> SignedTransaction {
		script_node(mock);
		let unsigned = adapter.build(&request()).await.unwrap();
		adapter.sign(&unsigned, &FakeSigner::new(&from())).await.unwrap()
	}

	#[tokio::test]
	async fn test_build_selects_utxos() {
		let (adapter, mock, _) = adapter();
		script_node(&mock);

		let unsigned = adapter.build(&request()).await.unwrap();
		assert_eq!(unsigned.chain_id, "bitcoin");
		assert_eq!(unsigned.nonce, None);
		assert_eq!(unsigned.fee, U256::from(3_740u64));
		match &unsigned.details {
			BuildDetails::Utxo {
				inputs,
				change_amount,
				fee_rate,
				..
			} => {
				assert_eq!(inputs.len(), 2);
				assert_eq!(*change_amount, 16_260);
				assert_eq!(*fee_rate, 10);
			},
			other => panic!("unexpected details {:?}", other),
		}
		assert_eq!(
			mock.params("listunspent")[0],
			json!([0, 9_999_999, [from()]])
		);

		let again = adapter.build(&request()).await.unwrap();
		assert_eq!(unsigned.id, again.id);
	}

	#[tokio::test]
	async fn test_build_uses_default_rate_when_node_cannot_estimate() {
		let (adapter, mock, _) = adapter();
		script_node(&mock);
		mock.set_response(
			"estimatesmartfee",
			json!({"errors": ["Insufficient data or no feerate found"]}),
		);

		let unsigned = adapter.build(&request()).await.unwrap();
		assert!(matches!(
			unsigned.details,
			BuildDetails::Utxo { fee_rate: 10, .. }
		));
	}

	#[tokio::test]
	async fn test_build_insufficient_funds() {
		let (adapter, mock, _) = adapter();
		script_node(&mock);
		mock.set_response("listunspent", json!([]));

		let err = adapter.build(&request()).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InsufficientFunds);
	}

	#[tokio::test]
	async fn test_build_rejects_invalid_request_without_rpc() {
		let (adapter, mock, _) = adapter();
		let mut bad = request();
		bad.to = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".into();

		let err = adapter.build(&bad).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidAddress);
		assert_eq!(mock.call_count("listunspent"), 0);
	}

	#[tokio::test]
	async fn test_sign_hash_is_txid() {
		let (adapter, mock, _) = adapter();
		script_node(&mock);
		let unsigned = adapter.build(&request()).await.unwrap();

		let signer = FakeSigner::new(&from());
		let signed = adapter.sign(&unsigned, &signer).await.unwrap();
		assert_eq!(signed.tx_hash, unsigned.id);
		assert_eq!(signed.serialized_tx, unsigned.signing_payload);
		assert_eq!(signed.signature.len(), 65);
		assert_eq!(signer.calls(), 1);
	}

	#[tokio::test]
	async fn test_sign_is_exact_about_addresses() {
		let (adapter, mock, _) = adapter();
		script_node(&mock);
		let unsigned = adapter.build(&request()).await.unwrap();

		let signer = FakeSigner::new(&from().to_uppercase());
		let err = adapter.sign(&unsigned, &signer).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::AddressMismatch);
		assert_eq!(signer.calls(), 0);

		let err = adapter
			.sign(&unsigned, &FakeSigner::rejecting(&from()))
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::UserRejected);
	}

	#[tokio::test]
	async fn test_broadcast_is_idempotent() {
		let (adapter, mock, store) = adapter();
		let signed = signed(&adapter, &mock).await;
		mock.set_response("sendrawtransaction", json!(signed.tx_hash));

		let first = adapter.broadcast(&signed).await.unwrap();
		let second = adapter.broadcast(&signed).await.unwrap();
		assert_eq!(first.tx_hash, second.tx_hash);
		assert_eq!(mock.call_count("sendrawtransaction"), 1);
		assert_eq!(
			mock.params("sendrawtransaction")[0],
			json!([hex::encode(&signed.serialized_tx)])
		);

		let state = store.get(&signed.tx_hash).await.unwrap().unwrap();
		assert_eq!(state.raw_tx, signed.serialized_tx);
	}

	#[tokio::test]
	async fn test_broadcast_min_relay_fee_is_classified() {
		let (adapter, mock, store) = adapter();
		let signed = signed(&adapter, &mock).await;
		mock.set_error(
			"sendrawtransaction",
			RpcError::Rpc {
				code: -26,
				message: "min relay fee not met, 100 < 141".into(),
			},
		);

		let err = adapter.broadcast(&signed).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::FeeTooLow);
		assert!(store.get(&signed.tx_hash).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_query_status_classification() {
		let (adapter, mock, _) = adapter();
		let hash = "cc".repeat(32);

		mock.set_error(
			"getrawtransaction",
			RpcError::Rpc {
				code: -5,
				message: "No such mempool or blockchain transaction".into(),
			},
		);
		let err = adapter.query_status(&hash).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::TxNotFound);

		mock.set_error("getrawtransaction", RpcError::Timeout("30s".into()));
		let err = adapter.query_status(&hash).await.unwrap_err();
		assert_eq!(err.code(), ErrorCode::RpcTimeout);

		mock.set_response("getrawtransaction", raw_tx(0));
		let status = adapter.query_status(&hash).await.unwrap();
		assert_eq!(status.status, TxStatus::Pending);
		assert_eq!(status.block_number, None);

		mock.set_response("getrawtransaction", raw_tx(2));
		mock.set_response("getblock", json!({"height": 840_000}));
		let status = adapter.query_status(&hash).await.unwrap();
		assert_eq!(status.status, TxStatus::Confirmed);
		assert_eq!(status.confirmations, 2);
		assert_eq!(status.block_number, Some(840_000));
		assert_eq!(status.block_hash.as_deref(), Some(BLOCK_HASH));

		mock.set_response("getrawtransaction", raw_tx(6));
		mock.set_error("getblock", RpcError::Timeout("30s".into()));
		let status = adapter.query_status(&hash).await.unwrap();
		assert_eq!(status.status, TxStatus::Finalized);
		assert_eq!(status.block_number, None);
	}

	#[tokio::test]
	async fn test_query_status_reconciles_store() {
		let (adapter, mock, store) = adapter();
		let hash = "cc".repeat(32);
		store
			.set(TxState::submitted(hash.clone(), "bitcoin", vec![0x01]))
			.await
			.unwrap();
		mock.set_response("getrawtransaction", raw_tx(1));
		mock.set_response("getblock", json!({"height": 840_000}));

		adapter.query_status(&hash).await.unwrap();
		assert_eq!(
			store.get(&hash).await.unwrap().unwrap().status,
			TxStatus::Confirmed
		);
	}

	#[tokio::test]
	async fn test_derive_p2wpkh() {
		let (adapter, _, _) = adapter();
		let path = "m/44'/0'/0'/0/3";

		let a = adapter.derive(&FakeKeySource::compressed(), path).await.unwrap();
		let b = adapter.derive(&FakeKeySource::uncompressed(), path).await.unwrap();
		assert_eq!(a.address, b.address);
		assert!(a.address.starts_with("bc1q"));
		assert_eq!(a.format, "P2WPKH");
		assert_eq!(a.chain_id, "bitcoin");

		let testnet = BitcoinAdapter::new(
			BitcoinNetwork::Testnet,
			Arc::new(MockRpcClient::new()),
			Arc::new(MemoryStore::new()),
		);
		let t = testnet.derive(&FakeKeySource::compressed(), path).await.unwrap();
		assert!(t.address.starts_with("tb1q"));

		let err = adapter
			.derive(&FakeKeySource::compressed(), "m/44'/60'/0'/0/0")
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidDerivationPath);
	}

	#[tokio::test]
	async fn test_capabilities() {
		let (adapter, _, _) = adapter();
		let caps = adapter.capabilities();
		assert_eq!(caps, adapter.capabilities());
		assert!(caps.supports_rbf);
		assert!(!caps.supports_eip1559);
		assert_eq!(caps.max_memo_length, 80);
		assert_eq!(caps.min_confirmations, 6);
	}

	#[tokio::test]
	async fn test_estimate_quotes_typical_size() {
		let (adapter, mock, _) = adapter();
		mock.set_response("estimatesmartfee", json!({"feerate": 0.0001}));

		let estimate = adapter
			.estimate(&request().with_speed(FeeSpeed::Fast))
			.await
			.unwrap();
		assert_eq!(estimate.recommended, U256::from(1_400u64));
		assert_eq!(estimate.estimated_blocks, 1);
		assert_eq!(estimate.chain_id, "bitcoin");

		let sized = adapter
			.fee_estimator()
			.estimate_with_utxos(&request(), 1)
			.await;
		// 10 + 68 + 31 * 2 = 140 vbytes, the quoted size.
		assert_eq!(sized.recommended, U256::from(1_400u64));
	}

	#[tokio::test(start_paused = true)]
	async fn test_subscribe_status_follows_confirmations() {
		let (adapter, mock, _) = adapter();
		let hash = "cc".repeat(32);
		mock.set_response("getrawtransaction", raw_tx(0));
		mock.set_response("getblock", json!({"height": 840_000}));

		let (handle, signal) = cancellation();
		let mut stream = adapter.subscribe_status(&hash, signal).await.unwrap();
		assert_eq!(stream.next().await.unwrap().status, TxStatus::Pending);

		mock.set_response("getrawtransaction", raw_tx(6));
		let update = stream.next().await.unwrap();
		assert_eq!(update.status, TxStatus::Finalized);
		assert_eq!(update.block_number, Some(840_000));

		handle.cancel();
		assert!(stream.next().await.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn test_fee_updates_every_interval() {
		let (adapter, mock, _) = adapter();
		mock.set_response("estimatesmartfee", json!({"feerate": 0.0001}));

		let (handle, signal) = cancellation();
		let mut stream = adapter
			.subscribe_fee_updates(&request(), Duration::from_secs(5), signal)
			.await
			.unwrap();
		assert_eq!(stream.next().await.unwrap().recommended, U256::from(1_400u64));

		mock.set_response("estimatesmartfee", json!({"feerate": 0.0002}));
		assert_eq!(stream.next().await.unwrap().recommended, U256::from(2_800u64));

		handle.cancel();
		assert!(stream.next().await.is_none());
	}

	#[tokio::test]
	async fn test_factory_validates_section() {
		let store: Arc<dyn TransactionStateStore> = Arc::new(MemoryStore::new());
		let metrics: Arc<dyn ChainMetrics> = Arc::new(NoopMetrics);
		let config: toml::Value = toml::from_str(
			r#"
			implementation = "bitcoin"
			rpc_urls = ["http://127.0.0.1:18443"]
			auth_token = "user:pass"
			"#,
		)
		.unwrap();

		let adapter =
			create_adapter("bitcoin-regtest", &config, store.clone(), metrics.clone()).unwrap();
		assert_eq!(adapter.chain_id(), "bitcoin-regtest");

		let err = create_adapter("ethereum", &config, store.clone(), metrics.clone())
			.err()
			.unwrap();
		assert!(matches!(err, AdapterError::Configuration(_)));

		let evm: toml::Value =
			toml::from_str("implementation = \"evm\"\nrpc_urls = [\"http://127.0.0.1:8332\"]")
				.unwrap();
		let err = create_adapter("bitcoin", &evm, store, metrics).err().unwrap();
		assert!(matches!(err, AdapterError::Configuration(_)));
	}

	#[test]
	fn test_networks() {
		for network in [
			BitcoinNetwork::Mainnet,
			BitcoinNetwork::Testnet,
			BitcoinNetwork::Regtest,
		] {
			assert_eq!(BitcoinNetwork::from_chain_id(network.chain_id()), Some(network));
		}
		assert_eq!(BitcoinNetwork::Regtest.network(), Network::Regtest);
	}

	#[test]
	fn test_txid_hex_is_display_order() {
		let tx = bitcoin::Transaction {
			version: bitcoin::transaction::Version::TWO,
			lock_time: bitcoin::absolute::LockTime::ZERO,
			input: vec![],
			output: vec![],
		};
		let bytes = bitcoin::consensus::encode::serialize(&tx);
		assert_eq!(txid_hex(&bytes), tx.compute_txid().to_string());
	}
}
