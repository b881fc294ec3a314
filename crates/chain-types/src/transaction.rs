//! Transaction lifecycle types.
//!
//! A [`TransactionRequest`] is turned into an [`UnsignedTransaction`] by an
//! adapter's `build`, into a [`SignedTransaction`] by `sign`, and into a
//! [`BroadcastReceipt`] by `broadcast`. Confirmation progress is reported as
//! [`TransactionStatus`].

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired inclusion speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSpeed {
	Slow,
	#[default]
	Normal,
	Fast,
}

impl FeeSpeed {
	/// Expected number of blocks until inclusion.
	pub fn estimated_blocks(&self) -> u32 {
		match self {
			FeeSpeed::Fast => 1,
			FeeSpeed::Normal => 3,
			FeeSpeed::Slow => 6,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			FeeSpeed::Slow => "slow",
			FeeSpeed::Normal => "normal",
			FeeSpeed::Fast => "fast",
		}
	}
}

impl FromStr for FeeSpeed {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"slow" => Ok(FeeSpeed::Slow),
			"normal" => Ok(FeeSpeed::Normal),
			"fast" => Ok(FeeSpeed::Fast),
			other => Err(format!("unknown fee speed: {}", other)),
		}
	}
}

/// Chain-specific knobs a caller may set on a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
	/// Signal BIP-125 replaceability on UTXO chains.
	pub rbf_enabled: bool,
	/// Change destination on UTXO chains; defaults to the sender.
	pub change_address: Option<String>,
	/// Gas limit override on account chains.
	pub gas_limit: Option<u64>,
}

/// A caller's intent to move funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
	pub from: String,
	pub to: String,
	/// Asset symbol, e.g. `ETH` or `BTC`.
	pub asset: String,
	/// Amount in the chain's smallest unit.
	pub amount: U256,
	#[serde(default)]
	pub memo: Option<String>,
	/// Upper bound on the total fee the caller accepts.
	#[serde(default)]
	pub max_fee: Option<U256>,
	#[serde(default)]
	pub confirm_by: Option<DateTime<Utc>>,
	#[serde(default)]
	pub fee_speed: FeeSpeed,
	#[serde(default)]
	pub options: TransferOptions,
}

impl TransactionRequest {
	pub fn new(
		from: impl Into<String>,
		to: impl Into<String>,
		asset: impl Into<String>,
		amount: U256,
	) -> Self {
		Self {
			from: from.into(),
			to: to.into(),
			asset: asset.into(),
			amount,
			memo: None,
			max_fee: None,
			confirm_by: None,
			fee_speed: FeeSpeed::default(),
			options: TransferOptions::default(),
		}
	}

	pub fn with_speed(mut self, speed: FeeSpeed) -> Self {
		self.fee_speed = speed;
		self
	}

	pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
		self.memo = Some(memo.into());
		self
	}

	pub fn with_options(mut self, options: TransferOptions) -> Self {
		self.options = options;
		self
	}

	/// The memo, treating an empty string as absent.
	pub fn memo(&self) -> Option<&str> {
		self.memo.as_deref().filter(|m| !m.is_empty())
	}
}

/// A spent output selected as a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
	pub txid: String,
	pub vout: u32,
	/// Value in satoshis.
	pub amount: u64,
	pub script_pubkey: String,
	pub address: Option<String>,
	pub confirmations: u64,
}

/// Family-specific build results kept for audit and rebroadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum BuildDetails {
	Evm {
		network_id: u64,
		gas_limit: u64,
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
	Utxo {
		inputs: Vec<UtxoInput>,
		change_amount: u64,
		change_address: Option<String>,
		tx_size: usize,
		fee_rate: u64,
	},
}

/// Output of `build`, input of `sign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
	pub id: String,
	pub chain_id: String,
	pub from: String,
	pub to: String,
	pub amount: U256,
	pub fee: U256,
	/// Account nonce; absent on UTXO chains.
	pub nonce: Option<u64>,
	/// Bytes handed to the signer. Never empty.
	#[serde(with = "crate::utils::serde_hex")]
	pub signing_payload: Vec<u8>,
	/// Audit summary of from/to/amount/nonce/fees. Never signed.
	pub human_readable: String,
	pub details: BuildDetails,
	pub created_at: DateTime<Utc>,
}

/// Output of `sign`, input of `broadcast`.
///
/// The embedded [`UnsignedTransaction`] is a snapshot taken at signing time
/// and is only reachable through a shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
	unsigned: UnsignedTransaction,
	#[serde(with = "crate::utils::serde_hex")]
	pub signature: Vec<u8>,
	pub signed_by: String,
	pub tx_hash: String,
	#[serde(with = "crate::utils::serde_hex")]
	pub serialized_tx: Vec<u8>,
	pub signed_at: DateTime<Utc>,
}

impl SignedTransaction {
	pub fn new(
		unsigned: UnsignedTransaction,
		signature: Vec<u8>,
		signed_by: String,
		tx_hash: String,
		serialized_tx: Vec<u8>,
	) -> Self {
		Self {
			unsigned,
			signature,
			signed_by,
			tx_hash,
			serialized_tx,
			signed_at: Utc::now(),
		}
	}

	/// The transaction as it was when signed.
	pub fn unsigned(&self) -> &UnsignedTransaction {
		&self.unsigned
	}

	pub fn chain_id(&self) -> &str {
		&self.unsigned.chain_id
	}
}

/// Lifecycle status of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
	/// Known to the network, not yet in a block.
	Pending,
	/// In a block, below the finality threshold.
	Confirmed,
	/// At or beyond the finality threshold.
	Finalized,
	/// Reverted or rejected by the chain.
	Failed,
}

impl TxStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, TxStatus::Finalized | TxStatus::Failed)
	}

	/// Whether moving from `self` to `next` is forward progress.
	///
	/// Pending may move anywhere, Confirmed only to Finalized, and terminal
	/// states never move.
	pub fn can_advance_to(&self, next: TxStatus) -> bool {
		match (self, next) {
			(TxStatus::Pending, TxStatus::Pending) => false,
			(TxStatus::Pending, _) => true,
			(TxStatus::Confirmed, TxStatus::Finalized) => true,
			_ => false,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			TxStatus::Pending => "pending",
			TxStatus::Confirmed => "confirmed",
			TxStatus::Finalized => "finalized",
			TxStatus::Failed => "failed",
		}
	}
}

impl fmt::Display for TxStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Result of `broadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
	pub tx_hash: String,
	pub chain_id: String,
	pub submitted_at: DateTime<Utc>,
	pub rpc_endpoint: Option<String>,
	pub status_url: Option<String>,
	pub initial_status: TxStatus,
	/// Number of effective submissions recorded for this hash.
	pub retry_count: u32,
}

/// Snapshot of a transaction's confirmation progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
	pub tx_hash: String,
	pub status: TxStatus,
	pub confirmations: u64,
	pub block_number: Option<u64>,
	pub block_hash: Option<String>,
	pub updated_at: DateTime<Utc>,
	pub error: Option<String>,
}

impl TransactionStatus {
	pub fn pending(tx_hash: impl Into<String>) -> Self {
		Self {
			tx_hash: tx_hash.into(),
			status: TxStatus::Pending,
			confirmations: 0,
			block_number: None,
			block_hash: None,
			updated_at: Utc::now(),
			error: None,
		}
	}

	/// Equality on everything except `updated_at`.
	pub fn same_state(&self, other: &TransactionStatus) -> bool {
		self.tx_hash == other.tx_hash
			&& self.status == other.status
			&& self.confirmations == other.confirmations
			&& self.block_number == other.block_number
			&& self.block_hash == other.block_hash
			&& self.error == other.error
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_moves_forward_only() {
		use TxStatus::*;

		assert!(Pending.can_advance_to(Confirmed));
		assert!(Pending.can_advance_to(Failed));
		assert!(Pending.can_advance_to(Finalized));
		assert!(Confirmed.can_advance_to(Finalized));

		assert!(!Confirmed.can_advance_to(Pending));
		assert!(!Finalized.can_advance_to(Confirmed));
		assert!(!Failed.can_advance_to(Finalized));
		assert!(!Pending.can_advance_to(Pending));
	}

	#[test]
	fn test_status_serializes_lowercase() {
		let json = serde_json::to_string(&TxStatus::Finalized).unwrap();
		assert_eq!(json, "\"finalized\"");
		let parsed: TxStatus = serde_json::from_str("\"pending\"").unwrap();
		assert_eq!(parsed, TxStatus::Pending);
	}

	#[test]
	fn test_empty_memo_is_absent() {
		let req = TransactionRequest::new("a", "b", "ETH", U256::from(1)).with_memo("");
		assert_eq!(req.memo(), None);
		let req = req.with_memo("hi");
		assert_eq!(req.memo(), Some("hi"));
	}

	#[test]
	fn test_same_state_ignores_timestamp() {
		let a = TransactionStatus::pending("0xabc");
		let mut b = a.clone();
		b.updated_at = a.updated_at + chrono::Duration::seconds(5);
		assert!(a.same_state(&b));

		b.confirmations = 1;
		assert!(!a.same_state(&b));
	}

	#[test]
	fn test_fee_speed_parse() {
		assert_eq!("FAST".parse::<FeeSpeed>().unwrap(), FeeSpeed::Fast);
		assert!("turbo".parse::<FeeSpeed>().is_err());
		assert_eq!(FeeSpeed::Slow.estimated_blocks(), 6);
	}
}
