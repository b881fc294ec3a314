//! Persisted per-transaction lifecycle state.

use crate::transaction::TxStatus;
use crate::utils::normalize_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the state store remembers about one broadcast transaction.
///
/// Keyed by `tx_hash`. `first_seen` is fixed at creation, `retry_count`
/// never decreases and `status` only moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxState {
	pub tx_hash: String,
	pub retry_count: u32,
	pub first_seen: DateTime<Utc>,
	pub last_retry: DateTime<Utc>,
	pub status: TxStatus,
	pub chain_id: String,
	#[serde(with = "crate::utils::serde_hex")]
	pub raw_tx: Vec<u8>,
}

impl TxState {
	/// State for a first successful submission.
	pub fn submitted(tx_hash: impl Into<String>, chain_id: impl Into<String>, raw_tx: Vec<u8>) -> Self {
		let now = Utc::now();
		Self {
			tx_hash: tx_hash.into(),
			retry_count: 1,
			first_seen: now,
			last_retry: now,
			status: TxStatus::Pending,
			chain_id: chain_id.into(),
			raw_tx,
		}
	}

	/// Records another submission attempt.
	pub fn record_retry(&mut self) {
		self.retry_count = self.retry_count.saturating_add(1);
		self.last_retry = Utc::now();
	}

	/// Moves to `next` if that is forward progress. Returns whether it moved.
	pub fn advance(&mut self, next: TxStatus) -> bool {
		if self.status.can_advance_to(next) {
			self.status = next;
			true
		} else {
			false
		}
	}

	/// Whether `hash` names this transaction, ignoring case and `0x`.
	pub fn matches_hash(&self, hash: &str) -> bool {
		normalize_hash(&self.tx_hash) == normalize_hash(hash)
	}
}
