//! Fee estimate types.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded, confidence-scored fee estimate in the chain's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
	pub chain_id: String,
	pub timestamp: DateTime<Utc>,
	pub min_fee: U256,
	pub recommended: U256,
	pub max_fee: U256,
	/// 0..=100.
	pub confidence: u8,
	pub reason: String,
	pub estimated_blocks: u32,
	/// EIP-1559 base fee per gas, absent on chains without one.
	pub base_fee: Option<U256>,
}

impl FeeEstimate {
	/// Checks `0 < min <= recommended <= max` and `confidence <= 100`.
	pub fn is_well_formed(&self) -> bool {
		!self.min_fee.is_zero()
			&& self.min_fee <= self.recommended
			&& self.recommended <= self.max_fee
			&& self.confidence <= 100
	}

	/// Scales all three bounds by `numerator / denominator`.
	///
	/// Used to move an estimate computed for a reference transaction size
	/// (21000 gas, 140 vbytes) to the size of a concrete transaction.
	pub fn rescaled(&self, numerator: u64, denominator: u64) -> Self {
		let denominator = U256::from(denominator.max(1));
		let numerator = U256::from(numerator);
		let scale = |v: U256| v.saturating_mul(numerator) / denominator;

		let bounds = FeeBounds::new(
			scale(self.min_fee),
			scale(self.recommended),
			scale(self.max_fee),
		);

		Self {
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			..self.clone()
		}
	}
}

/// Normalised `(min, recommended, max)` triple.
///
/// Construction enforces `1 <= min <= recommended <= max`, which holds even
/// when a node reports degenerate inputs such as a zero base fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBounds {
	pub min: U256,
	pub recommended: U256,
	pub max: U256,
}

impl FeeBounds {
	pub fn new(min: U256, recommended: U256, max: U256) -> Self {
		let min = min.max(U256::from(1));
		let recommended = recommended.max(min);
		let max = max.max(recommended);
		Self {
			min,
			recommended,
			max,
		}
	}

	/// Bounds at `min_pct%` and `max_pct%` of `recommended`.
	pub fn around(recommended: U256, min_pct: u64, max_pct: u64) -> Self {
		let hundred = U256::from(100);
		Self::new(
			recommended * U256::from(min_pct) / hundred,
			recommended,
			recommended * U256::from(max_pct) / hundred,
		)
	}
}
