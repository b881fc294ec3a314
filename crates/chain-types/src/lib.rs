//! Common types module for the chain adapter workspace.
//!
//! This module defines the data model shared by every adapter: transaction
//! requests and their built, signed and broadcast forms, fee estimates,
//! chain capabilities, persisted transaction state, and the stable error
//! codes surfaced to callers. It also hosts the external key-material
//! interfaces and the small configuration framework used by all factories.

/// Cooperative cancellation for long-lived subscriptions.
pub mod cancel;
/// Per-chain feature flags.
pub mod capabilities;
/// Stable error codes and retry classification.
pub mod error;
/// Fee estimates and bound normalisation.
pub mod fee;
/// Key sources, signers and derived addresses.
pub mod keys;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secret wrapper for credentials found in configuration.
pub mod secret_string;
/// Persisted per-transaction lifecycle state.
pub mod storage;
/// Transaction lifecycle types from request to receipt.
pub mod transaction;
/// Utility functions for hex handling and display formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use capabilities::Capabilities;
pub use error::{ErrorClass, ErrorCode, ErrorKind};
pub use fee::{FeeBounds, FeeEstimate};
pub use keys::{DerivedAddress, KeySource, KeySourceError, KeySourceKind, Signer, SignerError};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::TxState;
pub use transaction::{
	BroadcastReceipt, BuildDetails, FeeSpeed, SignedTransaction, TransactionRequest,
	TransactionStatus, TransferOptions, TxStatus, UnsignedTransaction, UtxoInput,
};
pub use utils::{
	btc_to_sats, format_gwei, normalize_hash, parse_quantity_u128, parse_quantity_u256,
	parse_quantity_u64, truncate_id, with_0x_prefix, without_0x_prefix,
};
pub use validation::*;
