//! EIP-1559 fee model.
//!
//! Estimates are quoted for a plain 21000 gas transfer. The per-gas price is
//! the base fee of the latest block plus the mean median tip of the last ten
//! blocks, both scaled by a per-speed multiplier.

use super::rpc::{EvmRpc, DEFAULT_PRIORITY_FEE};
use crate::{FeeEstimator, FALLBACK_CONFIDENCE, FALLBACK_REASON};
use alloy_primitives::U256;
use async_trait::async_trait;
use chain_types::{format_gwei, FeeBounds, FeeEstimate, FeeSpeed, TransactionRequest};
use chrono::Utc;

/// Gas used by a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// Base fee assumed by `build` when the latest block cannot be read.
pub const FALLBACK_BASE_FEE: u128 = 30 * GWEI;

const GWEI: u128 = 1_000_000_000;

/// Lower and upper bound as a percentage of the recommended price.
const MIN_PCT: u64 = 80;
const MAX_PCT: u64 = 150;

/// Per-gas prices written into a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

impl FeeParams {
	/// `max_fee = base * m + tip` with m of 3, 2 or 1; the tip doubles for
	/// fast transfers.
	pub fn for_speed(base_fee: u128, priority_fee: u128, speed: FeeSpeed) -> Self {
		let max_fee_per_gas = base_fee
			.saturating_mul(u128::from(multiplier(speed)))
			.saturating_add(priority_fee);
		let max_priority_fee_per_gas = match speed {
			FeeSpeed::Fast => priority_fee.saturating_mul(2),
			_ => priority_fee,
		};
		Self {
			max_fee_per_gas,
			max_priority_fee_per_gas,
		}
	}
}

fn multiplier(speed: FeeSpeed) -> u64 {
	match speed {
		FeeSpeed::Fast => 3,
		FeeSpeed::Normal => 2,
		FeeSpeed::Slow => 1,
	}
}

#[derive(Clone)]
pub struct EvmFeeEstimator {
	chain_id: String,
	rpc: EvmRpc,
}

impl EvmFeeEstimator {
	pub(crate) fn new(chain_id: impl Into<String>, rpc: EvmRpc) -> Self {
		Self {
			chain_id: chain_id.into(),
			rpc,
		}
	}

	/// Prices for `build`. Unlike [`FeeEstimator::estimate`], a failed base
	/// fee lookup is replaced by [`FALLBACK_BASE_FEE`] rather than the
	/// fallback table.
	pub(crate) async fn fee_params(&self, speed: FeeSpeed) -> FeeParams {
		let base_fee = self.rpc.base_fee().await.unwrap_or_else(|err| {
			tracing::warn!(chain_id = %self.chain_id, error = %err, "Base fee unavailable, using default");
			FALLBACK_BASE_FEE
		});
		let priority_fee = self.priority_fee().await;
		FeeParams::for_speed(base_fee, priority_fee, speed)
	}

	async fn priority_fee(&self) -> u128 {
		self.rpc.priority_fee().await.unwrap_or_else(|err| {
			tracing::debug!(chain_id = %self.chain_id, error = %err, "Fee history unavailable");
			DEFAULT_PRIORITY_FEE
		})
	}

	/// Estimate for a transaction using `gas_limit` instead of 21000 gas.
	pub async fn estimate_with_gas_limit(
		&self,
		request: &TransactionRequest,
		gas_limit: u64,
	) -> FeeEstimate {
		let base = FeeEstimator::estimate(self, request).await;
		let per_gas = base.recommended / U256::from(TRANSFER_GAS);
		let bounds = FeeBounds::around(per_gas * U256::from(gas_limit), MIN_PCT, MAX_PCT);
		FeeEstimate {
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			..base
		}
	}

	fn quote(per_gas: U256) -> FeeBounds {
		let hundred = U256::from(100);
		let gas = U256::from(TRANSFER_GAS);
		FeeBounds::new(
			per_gas * U256::from(MIN_PCT) / hundred * gas,
			per_gas * gas,
			per_gas * U256::from(MAX_PCT) / hundred * gas,
		)
	}
}

#[async_trait]
impl FeeEstimator for EvmFeeEstimator {
	async fn estimate(&self, request: &TransactionRequest) -> FeeEstimate {
		let speed = request.fee_speed;
		let base_fee = match self.rpc.base_fee().await {
			Ok(fee) => fee,
			Err(err) => {
				tracing::warn!(chain_id = %self.chain_id, error = %err, "Fee estimation falling back");
				return self.fallback(speed);
			},
		};
		let priority_fee = self.priority_fee().await;

		let m = U256::from(multiplier(speed));
		let per_gas = U256::from(base_fee) * m + U256::from(priority_fee) * m;
		let bounds = Self::quote(per_gas);
		let confidence = confidence(base_fee, priority_fee);

		FeeEstimate {
			chain_id: self.chain_id.clone(),
			timestamp: Utc::now(),
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			confidence,
			reason: reason(confidence, base_fee, priority_fee),
			estimated_blocks: speed.estimated_blocks(),
			base_fee: Some(U256::from(base_fee)),
		}
	}

	fn fallback(&self, speed: FeeSpeed) -> FeeEstimate {
		let (base_gwei, priority_gwei) = match speed {
			FeeSpeed::Fast => (50, 3),
			FeeSpeed::Normal => (30, 2),
			FeeSpeed::Slow => (20, 1),
		};
		let per_gas = U256::from((base_gwei + priority_gwei) * GWEI);
		let bounds = FeeBounds::around(per_gas * U256::from(TRANSFER_GAS), MIN_PCT, MAX_PCT);

		FeeEstimate {
			chain_id: self.chain_id.clone(),
			timestamp: Utc::now(),
			min_fee: bounds.min,
			recommended: bounds.recommended,
			max_fee: bounds.max,
			confidence: FALLBACK_CONFIDENCE,
			reason: FALLBACK_REASON.to_string(),
			estimated_blocks: speed.estimated_blocks(),
			base_fee: Some(U256::from(base_gwei * GWEI)),
		}
	}
}

/// Starts at 80 and loses points for a high base fee and a high tip.
fn confidence(base_fee: u128, priority_fee: u128) -> u8 {
	let base_gwei = base_fee / GWEI;
	let priority_gwei = priority_fee / GWEI;

	let mut confidence: i32 = 80;
	if base_gwei > 100 {
		confidence -= 15;
	} else if base_gwei > 50 {
		confidence -= 10;
	}
	if priority_gwei > 10 {
		confidence -= 10;
	} else if priority_gwei > 5 {
		confidence -= 5;
	}
	confidence.clamp(50, 100) as u8
}

fn reason(confidence: u8, base_fee: u128, priority_fee: u128) -> String {
	let base = format_gwei(U256::from(base_fee));
	let priority = format_gwei(U256::from(priority_fee));
	match confidence {
		80.. => format!(
			"Network stable, base fee {} Gwei, priority fee {} Gwei",
			base, priority
		),
		65..=79 => format!(
			"Network conditions normal, base fee {} Gwei, priority fee {} Gwei",
			base, priority
		),
		_ => format!("Network congested, base fee {} Gwei may fluctuate", base),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_rpc::{MockRpcClient, RpcError};
	use serde_json::json;
	use std::sync::Arc;

	fn estimator() -> (EvmFeeEstimator, Arc<MockRpcClient>) {
		let mock = Arc::new(MockRpcClient::new());
		(
			EvmFeeEstimator::new("ethereum", EvmRpc::new(mock.clone())),
			mock,
		)
	}

	fn request(speed: FeeSpeed) -> TransactionRequest {
		TransactionRequest::new("0xa", "0xb", "ETH", U256::from(1u64)).with_speed(speed)
	}

	fn gwei(n: u128) -> String {
		format!("{:#x}", n * GWEI)
	}

	fn script(mock: &MockRpcClient, base_gwei: u128, priority_gwei: u128) {
		mock.set_response(
			"eth_getBlockByNumber",
			json!({"baseFeePerGas": gwei(base_gwei)}),
		);
		mock.set_response(
			"eth_feeHistory",
			json!({"reward": [[gwei(priority_gwei)], [gwei(priority_gwei)]]}),
		);
	}

	#[tokio::test]
	async fn test_normal_speed_estimate() {
		let (estimator, mock) = estimator();
		script(&mock, 30, 2);

		let estimate = estimator.estimate(&request(FeeSpeed::Normal)).await;
		// (2 * 30 + 2 * 2) gwei over 21000 gas.
		let per_gas = U256::from(64 * GWEI);
		assert_eq!(estimate.recommended, per_gas * U256::from(21_000u64));
		assert_eq!(estimate.min_fee, U256::from(51_200_000_000u64 * 21_000));
		assert_eq!(estimate.max_fee, U256::from(96 * GWEI * 21_000));
		assert_eq!(estimate.confidence, 80);
		assert_eq!(estimate.estimated_blocks, 3);
		assert_eq!(estimate.base_fee, Some(U256::from(30 * GWEI)));
		assert_eq!(
			estimate.reason,
			"Network stable, base fee 30 Gwei, priority fee 2 Gwei"
		);
		assert!(estimate.is_well_formed());
	}

	#[test]
	fn test_confidence_thresholds() {
		let cases = [
			(30, 2, 80),
			(51, 2, 70),
			(101, 2, 65),
			(30, 6, 75),
			(30, 11, 70),
			(101, 11, 55),
			(500, 50, 55),
		];
		for (base, priority, expected) in cases {
			assert_eq!(
				confidence(base * GWEI, priority * GWEI),
				expected,
				"base {} priority {}",
				base,
				priority
			);
		}
		assert!(reason(70, 51 * GWEI, 2 * GWEI).starts_with("Network conditions normal"));
		assert_eq!(
			reason(55, 101 * GWEI, 11 * GWEI),
			"Network congested, base fee 101 Gwei may fluctuate"
		);
	}

	#[tokio::test]
	async fn test_fallback_when_block_unavailable() {
		let (estimator, mock) = estimator();
		mock.set_error(
			"eth_getBlockByNumber",
			RpcError::Transport("connection refused".into()),
		);

		for speed in [FeeSpeed::Fast, FeeSpeed::Normal, FeeSpeed::Slow] {
			let estimate = estimator.estimate(&request(speed)).await;
			assert_eq!(estimate.confidence, FALLBACK_CONFIDENCE);
			assert_eq!(estimate.reason, FALLBACK_REASON);
			assert_eq!(estimate.estimated_blocks, speed.estimated_blocks());
			assert!(estimate.is_well_formed());
		}

		let fast = estimator.fallback(FeeSpeed::Fast);
		assert_eq!(fast.recommended, U256::from(53 * GWEI * 21_000));
		assert_eq!(fast.base_fee, Some(U256::from(50 * GWEI)));
	}

	#[tokio::test]
	async fn test_missing_fee_history_uses_default_tip() {
		let (estimator, mock) = estimator();
		mock.set_response("eth_getBlockByNumber", json!({"baseFeePerGas": gwei(10)}));
		mock.set_error("eth_feeHistory", RpcError::Timeout("10s".into()));

		let estimate = estimator.estimate(&request(FeeSpeed::Slow)).await;
		assert_eq!(estimate.recommended, U256::from(12 * GWEI * 21_000));
		assert_ne!(estimate.reason, FALLBACK_REASON);
	}

	#[tokio::test]
	async fn test_zero_base_fee_still_well_formed() {
		let (estimator, mock) = estimator();
		mock.set_response("eth_getBlockByNumber", json!({"number": "0x1"}));
		mock.set_response("eth_feeHistory", json!({"reward": [["0x0"]]}));

		let estimate = estimator.estimate(&request(FeeSpeed::Normal)).await;
		assert!(estimate.is_well_formed());
		assert_eq!(estimate.min_fee, U256::from(1u64));
	}

	#[tokio::test]
	async fn test_estimate_with_gas_limit_rescales() {
		let (estimator, mock) = estimator();
		script(&mock, 30, 2);

		let estimate = estimator
			.estimate_with_gas_limit(&request(FeeSpeed::Normal), 42_000)
			.await;
		assert_eq!(estimate.recommended, U256::from(64 * GWEI * 42_000));
		assert_eq!(estimate.min_fee, U256::from(64 * GWEI * 42_000 * 80 / 100));
		assert!(estimate.is_well_formed());
	}

	#[test]
	fn test_fee_params_for_speed() {
		let fast = FeeParams::for_speed(30 * GWEI, 2 * GWEI, FeeSpeed::Fast);
		assert_eq!(fast.max_fee_per_gas, 92 * GWEI);
		assert_eq!(fast.max_priority_fee_per_gas, 4 * GWEI);

		let slow = FeeParams::for_speed(30 * GWEI, 2 * GWEI, FeeSpeed::Slow);
		assert_eq!(slow.max_fee_per_gas, 32 * GWEI);
		assert_eq!(slow.max_priority_fee_per_gas, 2 * GWEI);
	}
}
