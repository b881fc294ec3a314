//! Key material interfaces supplied by the wallet layer.
//!
//! Adapters never see private keys. A [`KeySource`] hands out public keys for
//! address derivation and a [`Signer`] produces signatures for an address it
//! controls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where key material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySourceKind {
	Mnemonic,
	#[serde(rename = "xpub")]
	XPub,
	#[serde(rename = "hardware")]
	HardwareWallet,
}

/// Errors reported by a key source.
#[derive(Debug, Error)]
pub enum KeySourceError {
	/// The path cannot be derived by this source.
	#[error("Invalid derivation path: {0}")]
	InvalidPath(String),
	/// The source is locked, disconnected or otherwise unusable.
	#[error("Key source unavailable: {0}")]
	Unavailable(String),
}

/// Errors reported by a signer.
#[derive(Debug, Error)]
pub enum SignerError {
	/// The user declined on the signing device.
	#[error("Signing rejected by user")]
	Rejected,
	/// The signing device did not answer in time.
	#[error("Signing device timed out")]
	Timeout,
	#[error("Signing failed: {0}")]
	Failed(String),
}

/// Public-key provider for BIP44 paths.
#[async_trait]
pub trait KeySource: Send + Sync {
	fn kind(&self) -> KeySourceKind;

	/// Returns the SEC1 public key (33-byte compressed or 65-byte
	/// uncompressed) at `path`, e.g. `m/44'/60'/0'/0/0`.
	async fn public_key(&self, path: &str) -> Result<Vec<u8>, KeySourceError>;
}

/// Signing capability for exactly one address.
#[async_trait]
pub trait Signer: Send + Sync {
	/// The address this signer controls, in the chain's canonical text form.
	fn address(&self) -> String;

	/// Signs a chain-specific payload and returns raw signature bytes.
	async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// An address derived from a key source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
	pub address: String,
	pub chain_id: String,
	pub derivation_path: String,
	#[serde(with = "crate::utils::serde_hex")]
	pub public_key: Vec<u8>,
	/// Encoding tag, e.g. `checksummed` or `P2WPKH`.
	pub format: String,
}
