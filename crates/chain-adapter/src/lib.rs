//! Chain adapters for the wallet transaction lifecycle.
//!
//! A [`ChainAdapter`] turns a [`TransactionRequest`] into an unsigned
//! transaction, has it signed by an external [`Signer`], broadcasts it
//! exactly once per hash and tracks its confirmations. One implementation
//! exists per chain family: `evm` for account-style chains and `bitcoin` for
//! UTXO-style chains. [`AdapterService`] routes calls to the adapter for a
//! chain id and records operation metrics.

use alloy_primitives::U256;
use async_trait::async_trait;
use chain_metrics::ChainMetrics;
use chain_rpc::RpcError;
use chain_storage::{StorageError, TransactionStateStore};
use chain_types::{
	BroadcastReceipt, CancelSignal, Capabilities, ConfigSchema, DerivedAddress, ErrorClass,
	ErrorCode, ErrorKind, FeeEstimate, FeeSpeed, ImplementationRegistry, KeySource,
	SignedTransaction, Signer, SignerError, TransactionRequest, TransactionStatus,
	UnsignedTransaction,
};
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod broadcast;
pub mod derivation;
pub mod service;
pub mod subscription;

mod settings;
mod signing;

pub mod implementations {
	pub mod bitcoin;
	pub mod evm;
}

#[cfg(test)]
pub(crate) mod test_support;

pub use service::AdapterService;

/// Errors that can occur during adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
	/// The node could not be reached or rejected the request.
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),
	/// The transaction state store failed.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	/// A request field is malformed or unsupported.
	#[error("{code}: {message}")]
	Validation { code: ErrorCode, message: String },
	/// The signer does not control the sending address.
	#[error("Address mismatch: signer controls {signer}, transaction is from {expected}")]
	AddressMismatch { expected: String, signer: String },
	#[error("Invalid derivation path {path}: {reason}")]
	InvalidPath { path: String, reason: String },
	#[error("Insufficient funds: have {available}, need {required}")]
	InsufficientFunds { available: U256, required: U256 },
	#[error("Transaction not found: {0}")]
	TxNotFound(String),
	#[error("Chain mismatch: transaction is for {actual}, adapter serves {expected}")]
	ChainMismatch { expected: String, actual: String },
	/// The node acknowledged a different hash than the one signed.
	#[error("Hash mismatch: node returned {returned}, signed hash is {expected}")]
	HashMismatch { expected: String, returned: String },
	#[error("Signing error: {0}")]
	Signing(#[from] SignerError),
	/// The key source cannot serve requests right now.
	#[error("Key source unavailable: {0}")]
	KeySourceUnavailable(String),
	/// A caller-supplied deadline elapsed.
	#[error("Deadline of {0:?} exceeded")]
	Timeout(Duration),
	#[error("Unsupported: {0}")]
	Unsupported(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl AdapterError {
	pub(crate) fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
		AdapterError::Validation {
			code,
			message: message.into(),
		}
	}

	/// Stable machine-readable code.
	pub fn code(&self) -> ErrorCode {
		match self {
			AdapterError::Rpc(err) => rpc_error_code(err),
			AdapterError::Storage(_) => ErrorCode::Persistence,
			AdapterError::Validation { code, .. } => *code,
			AdapterError::AddressMismatch { .. } => ErrorCode::AddressMismatch,
			AdapterError::InvalidPath { .. } => ErrorCode::InvalidDerivationPath,
			AdapterError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
			AdapterError::TxNotFound(_) => ErrorCode::TxNotFound,
			AdapterError::ChainMismatch { .. } => ErrorCode::ChainMismatch,
			AdapterError::HashMismatch { .. } => ErrorCode::HashMismatch,
			AdapterError::Signing(SignerError::Rejected) => ErrorCode::UserRejected,
			AdapterError::Signing(SignerError::Timeout) => ErrorCode::HardwareTimeout,
			AdapterError::Signing(SignerError::Failed(_)) => ErrorCode::SigningFailed,
			AdapterError::KeySourceUnavailable(_) => ErrorCode::HardwareTimeout,
			AdapterError::Timeout(_) => ErrorCode::RpcTimeout,
			AdapterError::Unsupported(_) | AdapterError::Configuration(_) => {
				ErrorCode::Configuration
			},
		}
	}

	/// Whether retrying, fixing the input, or asking the user is the way out.
	pub fn classification(&self) -> ErrorClass {
		self.code().class()
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			AdapterError::Storage(_) => ErrorKind::Persistence,
			AdapterError::Timeout(_) => ErrorKind::Timeout,
			_ if self.classification() == ErrorClass::Retryable => ErrorKind::Retryable,
			_ => ErrorKind::Validation,
		}
	}

	/// Suggested wait before retrying. `None` for errors that are not
	/// retryable.
	pub fn retry_after(&self) -> Option<Duration> {
		if self.classification() != ErrorClass::Retryable {
			return None;
		}
		let secs = match self.code() {
			ErrorCode::RpcTimeout => 5,
			ErrorCode::NetworkCongestion => 30,
			ErrorCode::NonceTooLow | ErrorCode::Persistence => 1,
			_ => 10,
		};
		Some(Duration::from_secs(secs))
	}
}

/// Maps an RPC failure onto a stable code. Node-side rejections are matched
/// on the message text, since nodes do not agree on error numbers.
fn rpc_error_code(err: &RpcError) -> ErrorCode {
	match err {
		RpcError::Timeout(_) => ErrorCode::RpcTimeout,
		RpcError::Rpc { message, .. } => {
			classify_node_message(message).unwrap_or(ErrorCode::RpcUnavailable)
		},
		_ => ErrorCode::RpcUnavailable,
	}
}

pub(crate) fn classify_node_message(message: &str) -> Option<ErrorCode> {
	let message = message.to_ascii_lowercase();
	if message.contains("nonce too low") {
		Some(ErrorCode::NonceTooLow)
	} else if message.contains("insufficient funds") {
		Some(ErrorCode::InsufficientFunds)
	} else if message.contains("underpriced")
		|| message.contains("fee too low")
		|| message.contains("insufficient fee")
		|| message.contains("min relay fee not met")
		|| message.contains("mempool min fee not met")
	{
		Some(ErrorCode::FeeTooLow)
	} else if message.contains("bad-txns") || message.contains("invalid") {
		Some(ErrorCode::InvalidTransaction)
	} else {
		None
	}
}

/// Live status updates; ends when the caller cancels.
pub type StatusStream = BoxStream<'static, TransactionStatus>;

/// Live fee estimates; ends when the caller cancels.
pub type FeeStream = BoxStream<'static, FeeEstimate>;

/// Uniform lifecycle interface over one chain.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
	/// Chain identifier such as `ethereum` or `bitcoin-testnet`.
	fn chain_id(&self) -> &str;

	/// Static feature flags. Equal on every call.
	fn capabilities(&self) -> Capabilities;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Derives the address at a BIP44 `path` from the key source's public
	/// key. Deterministic for a given key source and path.
	async fn derive(
		&self,
		key_source: &dyn KeySource,
		path: &str,
	) -> Result<DerivedAddress, AdapterError>;

	/// Validates the request and assembles an unsigned transaction with a
	/// signing payload and an audit summary.
	async fn build(&self, request: &TransactionRequest)
		-> Result<UnsignedTransaction, AdapterError>;

	/// Fee estimate for the request. Falls back to static tables instead of
	/// failing when the node is unreachable.
	async fn estimate(&self, request: &TransactionRequest) -> Result<FeeEstimate, AdapterError>;

	/// Signs `unsigned` after checking that `signer` controls its sender.
	async fn sign(
		&self,
		unsigned: &UnsignedTransaction,
		signer: &dyn Signer,
	) -> Result<SignedTransaction, AdapterError>;

	/// Submits `signed` at most once per hash; repeats return the stored
	/// receipt.
	async fn broadcast(&self, signed: &SignedTransaction) -> Result<BroadcastReceipt, AdapterError>;

	/// Current confirmation status, reconciled into the state store.
	async fn query_status(&self, tx_hash: &str) -> Result<TransactionStatus, AdapterError>;

	/// Emits the current status, then every change until `cancel` fires.
	async fn subscribe_status(
		&self,
		tx_hash: &str,
		cancel: CancelSignal,
	) -> Result<StatusStream, AdapterError>;

	/// Emits an estimate now and fresh ones every `interval` until `cancel`
	/// fires.
	async fn subscribe_fee_updates(
		&self,
		request: &TransactionRequest,
		interval: Duration,
		cancel: CancelSignal,
	) -> Result<FeeStream, AdapterError>;
}

/// Chain-specific fee model.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
	/// Never fails: RPC errors produce [`FeeEstimator::fallback`].
	async fn estimate(&self, request: &TransactionRequest) -> FeeEstimate;

	/// Static estimate used when the node cannot be asked.
	fn fallback(&self, speed: FeeSpeed) -> FeeEstimate;
}

/// Reason attached to every fallback estimate.
pub const FALLBACK_REASON: &str = "Using fallback estimates (RPC unavailable)";

/// Confidence attached to every fallback estimate.
pub const FALLBACK_CONFIDENCE: u8 = 50;

/// Runs `fut`, failing with [`AdapterError::Timeout`] once `deadline`
/// elapses. The inner future is dropped, which cancels any request it has in
/// flight.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, AdapterError>
where
	F: Future<Output = Result<T, AdapterError>>,
{
	tokio::time::timeout(deadline, fut)
		.await
		.map_err(|_| AdapterError::Timeout(deadline))?
}

pub type AdapterFactory = fn(
	&str,
	&toml::Value,
	Arc<dyn TransactionStateStore>,
	Arc<dyn ChainMetrics>,
) -> Result<Box<dyn ChainAdapter>, AdapterError>;

pub trait AdapterRegistry: ImplementationRegistry<Factory = AdapterFactory> {}

/// Every adapter family, keyed by its `implementation` name.
pub fn get_all_implementations() -> Vec<(&'static str, AdapterFactory)> {
	use implementations::{bitcoin, evm};

	vec![
		(evm::Registry::NAME, evm::Registry::factory()),
		(bitcoin::Registry::NAME, bitcoin::Registry::factory()),
	]
}
