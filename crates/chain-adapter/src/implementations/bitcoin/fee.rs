//! Fee-rate model for Bitcoin.
//!
//! Rates come from `estimatesmartfee` at three confirmation targets around
//! the requested speed and are quoted for a typical one-input P2WPKH
//! payment of [`ESTIMATED_TX_SIZE`] vbytes.

use super::rpc::BitcoinRpc;
use crate::{FeeEstimator, FALLBACK_CONFIDENCE, FALLBACK_REASON};
use alloy_primitives::U256;
use async_trait::async_trait;
use chain_types::{FeeBounds, FeeEstimate, FeeSpeed, TransactionRequest};
use chrono::Utc;

/// Size in vbytes the estimate is quoted for.
pub const ESTIMATED_TX_SIZE: u64 = 140;

/// Rate used by `build` when the node cannot estimate.
pub const FALLBACK_FEE_RATE: u64 = 10;

/// Per-input and per-output vbytes used when rescaling to a known input
/// count.
const INPUT_VBYTES: u64 = 68;
const OUTPUT_VBYTES: u64 = 31;
const OVERHEAD_VBYTES: u64 = 10;

#[derive(Clone)]
pub struct BitcoinFeeEstimator {
	chain_id: String,
	rpc: BitcoinRpc,
}

impl BitcoinFeeEstimator {
	pub(crate) fn new(chain_id: impl Into<String>, rpc: BitcoinRpc) -> Self {
		Self {
			chain_id: chain_id.into(),
			rpc,
		}
	}

	/// Rate in sat/vB for `build`.
	pub(crate) async fn fee_rate(&self, speed: FeeSpeed) -> u64 {
		self.rpc
			.estimate_smart_fee(speed.estimated_blocks())
			.await
			.unwrap_or_else(|err| {
				tracing::warn!(chain_id = %self.chain_id, error = %err, "Fee rate unavailable, using default");
				FALLBACK_FEE_RATE
			})
	}

	/// Estimate resized to a transaction spending `input_count` inputs.
	pub async fn estimate_with_utxos(
		&self,
		request: &TransactionRequest,
		input_count: usize,
	) -> FeeEstimate {
		let base = FeeEstimator::estimate(self, request).await;
		let outputs: u64 = if request.memo().is_some() { 3 } else { 2 };
		let size = OVERHEAD_VBYTES + INPUT_VBYTES * input_count as u64 + OUTPUT_VBYTES * outputs;
		base.rescaled(size, ESTIMATED_TX_SIZE)
	}
}

#[async_trait]
impl FeeEstimator for BitcoinFeeEstimator {
	async fn estimate(&self, request: &TransactionRequest) -> FeeEstimate {
		let speed = request.fee_speed;
		let target = speed.estimated_blocks();

		let rate = match self.rpc.estimate_smart_fee(target).await {
			Ok(rate) => rate,
			Err(err) => {
				tracing::warn!(chain_id = %self.chain_id, error = %err, "Fee estimation falling back");
				return self.fallback(speed);
			},
		};
		// A slower target bounds from below, a faster one from above.
		let mut min_rate = self
			.rpc
			.estimate_smart_fee(target * 2)
			.await
			.unwrap_or(rate * 80 / 100);
		let mut max_rate = self
			.rpc
			.estimate_smart_fee(target / 2 + 1)
			.await
			.unwrap_or(rate * 150 / 100);
		if min_rate > rate {
			min_rate = rate * 90 / 100;
		}
		if max_rate < rate {
			max_rate = rate * 120 / 100;
		}

		let size = U256::from(ESTIMATED_TX_SIZE);
		let bounds = FeeBounds::new(
			U256::from(min_rate) * size,
			U256::from(rate) * size,
			U256::from(max_rate) * size,
		);
		let confidence = confidence(min_rate, rate, max_rate);

		FeeEstimate {
			chain_id: self.chain_id.clone(),
			timestamp: Utc::now(),
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			confidence,
			reason: reason(confidence, rate),
			estimated_blocks: target,
			base_fee: None,
		}
	}

	fn fallback(&self, speed: FeeSpeed) -> FeeEstimate {
		let rate = match speed {
			FeeSpeed::Fast => 50,
			FeeSpeed::Normal => 20,
			FeeSpeed::Slow => 10,
		};
		let bounds = FeeBounds::new(
			U256::from(rate * 80 / 100 * ESTIMATED_TX_SIZE),
			U256::from(rate * ESTIMATED_TX_SIZE),
			U256::from(rate * 150 / 100 * ESTIMATED_TX_SIZE),
		);

		FeeEstimate {
			chain_id: self.chain_id.clone(),
			timestamp: Utc::now(),
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			confidence: FALLBACK_CONFIDENCE,
			reason: FALLBACK_REASON.to_string(),
			estimated_blocks: speed.estimated_blocks(),
			base_fee: None,
		}
	}
}

/// 100 minus the mean relative spread of the bounds, in percent.
fn confidence(min_rate: u64, rate: u64, max_rate: u64) -> u8 {
	if rate == 0 {
		return FALLBACK_CONFIDENCE;
	}
	let rate_f = rate as f64;
	let lower = rate.saturating_sub(min_rate) as f64 / rate_f;
	let upper = max_rate.saturating_sub(rate) as f64 / rate_f;
	let spread = (lower + upper) / 2.0;
	(100 - (spread * 100.0) as i64).clamp(50, 100) as u8
}

fn reason(confidence: u8, rate: u64) -> String {
	match confidence {
		90.. => format!(
			"Network stable, fee rate {} sat/vB with high certainty",
			rate
		),
		70..=89 => format!("Network conditions normal, fee rate {} sat/vB", rate),
		_ => format!("Network volatile, fee rate {} sat/vB may fluctuate", rate),
	}
}
