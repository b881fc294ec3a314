//! Stable error codes and retry classification.
//!
//! Crate-level error enums (`RpcError`, `StorageError`, `AdapterError`) carry
//! the detail; the types here are the coarse, serialisable view a caller uses
//! to decide whether to retry, fix its input, or ask the user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
	/// Transient; the same call may succeed later.
	Retryable,
	/// Permanent for these inputs.
	NonRetryable,
	/// Needs a human (hardware confirmation, rejected prompt, co-signers).
	UserIntervention,
}

impl fmt::Display for ErrorClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorClass::Retryable => "Retryable",
			ErrorClass::NonRetryable => "NonRetryable",
			ErrorClass::UserIntervention => "UserIntervention",
		};
		f.write_str(s)
	}
}

/// Top-level failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// RPC unavailable or timing out at the transport level.
	Retryable,
	/// Malformed address, amount, path, or a signer mismatch.
	Validation,
	/// State store I/O or corruption.
	Persistence,
	/// Caller-supplied deadline exceeded.
	Timeout,
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
	RpcTimeout,
	RpcUnavailable,
	NetworkCongestion,
	NonceTooLow,
	InvalidAddress,
	InvalidAmount,
	UnsupportedAsset,
	InsufficientFunds,
	InvalidTransaction,
	InvalidSignature,
	AddressMismatch,
	InvalidDerivationPath,
	TxNotFound,
	TxReverted,
	FeeTooLow,
	HardwareTimeout,
	UserRejected,
	RbfRequired,
	MultisigPending,
	ChainMismatch,
	HashMismatch,
	SigningFailed,
	Persistence,
	Configuration,
}

impl ErrorCode {
	/// Wire representation, e.g. `ERR_RPC_TIMEOUT`.
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::RpcTimeout => "ERR_RPC_TIMEOUT",
			ErrorCode::RpcUnavailable => "ERR_RPC_UNAVAILABLE",
			ErrorCode::NetworkCongestion => "ERR_NETWORK_CONGESTION",
			ErrorCode::NonceTooLow => "ERR_NONCE_TOO_LOW",
			ErrorCode::InvalidAddress => "ERR_INVALID_ADDRESS",
			ErrorCode::InvalidAmount => "ERR_INVALID_AMOUNT",
			ErrorCode::UnsupportedAsset => "ERR_UNSUPPORTED_ASSET",
			ErrorCode::InsufficientFunds => "ERR_INSUFFICIENT_FUNDS",
			ErrorCode::InvalidTransaction => "ERR_INVALID_TRANSACTION",
			ErrorCode::InvalidSignature => "ERR_INVALID_SIGNATURE",
			ErrorCode::AddressMismatch => "ERR_ADDRESS_MISMATCH",
			ErrorCode::InvalidDerivationPath => "ERR_INVALID_DERIVATION_PATH",
			ErrorCode::TxNotFound => "ERR_TX_NOT_FOUND",
			ErrorCode::TxReverted => "ERR_TX_REVERTED",
			ErrorCode::FeeTooLow => "ERR_FEE_TOO_LOW",
			ErrorCode::HardwareTimeout => "ERR_HARDWARE_TIMEOUT",
			ErrorCode::UserRejected => "ERR_USER_REJECTED",
			ErrorCode::RbfRequired => "ERR_RBF_REQUIRED",
			ErrorCode::MultisigPending => "ERR_MULTISIG_PENDING",
			ErrorCode::ChainMismatch => "ERR_CHAIN_MISMATCH",
			ErrorCode::HashMismatch => "ERR_HASH_MISMATCH",
			ErrorCode::SigningFailed => "ERR_SIGNING_FAILED",
			ErrorCode::Persistence => "ERR_PERSISTENCE",
			ErrorCode::Configuration => "ERR_CONFIGURATION",
		}
	}

	/// Default classification for this code.
	pub fn class(&self) -> ErrorClass {
		match self {
			ErrorCode::RpcTimeout
			| ErrorCode::RpcUnavailable
			| ErrorCode::NetworkCongestion
			| ErrorCode::NonceTooLow
			| ErrorCode::Persistence => ErrorClass::Retryable,
			ErrorCode::FeeTooLow
			| ErrorCode::HardwareTimeout
			| ErrorCode::UserRejected
			| ErrorCode::RbfRequired
			| ErrorCode::MultisigPending => ErrorClass::UserIntervention,
			_ => ErrorClass::NonRetryable,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_codes_render_wire_names() {
		assert_eq!(ErrorCode::RpcTimeout.to_string(), "ERR_RPC_TIMEOUT");
		assert_eq!(
			ErrorCode::InvalidDerivationPath.as_str(),
			"ERR_INVALID_DERIVATION_PATH"
		);
	}

	#[test]
	fn test_default_classes() {
		assert_eq!(ErrorCode::RpcUnavailable.class(), ErrorClass::Retryable);
		assert_eq!(ErrorCode::AddressMismatch.class(), ErrorClass::NonRetryable);
		assert_eq!(ErrorCode::FeeTooLow.class(), ErrorClass::UserIntervention);
	}
}
