//! Metrics and health reporting for chain adapters.
//!
//! Adapters and RPC clients record outcomes into a [`ChainMetrics`]
//! instance that is constructed by whoever composes them and passed in
//! explicitly. Readers get owned snapshots ([`AggregatedMetrics`],
//! [`MethodMetrics`]), a derived [`HealthStatus`], or a Prometheus text
//! exposition for an external scraper.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod implementations {
	pub mod noop;
	pub mod prometheus;
}

pub use implementations::noop::NoopMetrics;
pub use implementations::prometheus::PrometheusMetrics;

/// Success rate below which the RPC layer is reported as degraded.
pub const MIN_HEALTHY_SUCCESS_RATE: f64 = 0.90;
/// Average latency above which the RPC layer is reported as degraded.
pub const MAX_HEALTHY_LATENCY: Duration = Duration::from_secs(5);
/// Silence after the last successful call that counts as degraded.
pub const MAX_SUCCESS_GAP: Duration = Duration::from_secs(5 * 60);

/// Transaction operations tracked alongside RPC calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
	Build,
	Sign,
	Broadcast,
}

impl Operation {
	pub const ALL: [Operation; 3] = [Operation::Build, Operation::Sign, Operation::Broadcast];

	pub fn as_str(&self) -> &'static str {
		match self {
			Operation::Build => "build",
			Operation::Sign => "sign",
			Operation::Broadcast => "broadcast",
		}
	}
}

/// Three-state health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
	#[serde(rename = "OK")]
	Ok,
	Degraded,
	Down,
}

impl HealthState {
	/// Value of the `chainadapter_health_status` gauge.
	pub fn gauge(&self) -> f64 {
		match self {
			HealthState::Ok => 1.0,
			HealthState::Degraded => 0.5,
			HealthState::Down => 0.0,
		}
	}
}

impl fmt::Display for HealthState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			HealthState::Ok => "OK",
			HealthState::Degraded => "Degraded",
			HealthState::Down => "Down",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
	pub status: HealthState,
	pub message: String,
	pub checked_at: DateTime<Utc>,
	pub low_success_rate: bool,
	pub high_latency: bool,
	pub no_recent_success: bool,
}

impl HealthStatus {
	pub fn is_healthy(&self) -> bool {
		self.status == HealthState::Ok
	}

	pub fn is_degraded(&self) -> bool {
		self.status == HealthState::Degraded
	}

	pub fn is_down(&self) -> bool {
		self.status == HealthState::Down
	}
}

/// Outcome counters for one kind of operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationMetrics {
	pub total: u64,
	pub successful: u64,
	pub failed: u64,
	/// 0.0 when nothing has been recorded.
	pub success_rate: f64,
	pub avg_duration: Duration,
}

/// Snapshot across all RPC methods and transaction operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedMetrics {
	pub total_rpc_calls: u64,
	pub successful_rpc_calls: u64,
	pub failed_rpc_calls: u64,
	pub rpc_success_rate: f64,
	pub avg_rpc_duration: Duration,
	pub last_successful_call: Option<DateTime<Utc>>,
	pub build: OperationMetrics,
	pub sign: OperationMetrics,
	pub broadcast: OperationMetrics,
}

/// Snapshot for a single RPC method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodMetrics {
	pub method: String,
	pub total_calls: u64,
	pub successful_calls: u64,
	pub failed_calls: u64,
	pub success_rate: f64,
	pub avg_duration: Duration,
	pub min_duration: Duration,
	pub max_duration: Duration,
	pub last_successful_call: Option<DateTime<Utc>>,
	pub last_failed_call: Option<DateTime<Utc>>,
}

/// Thread-safe recorder and reader of adapter metrics.
pub trait ChainMetrics: Send + Sync {
	fn record_rpc_call(&self, method: &str, duration: Duration, success: bool);

	fn record_operation(&self, chain_id: &str, operation: Operation, duration: Duration, success: bool);

	fn record_build(&self, chain_id: &str, duration: Duration, success: bool) {
		self.record_operation(chain_id, Operation::Build, duration, success)
	}

	fn record_sign(&self, chain_id: &str, duration: Duration, success: bool) {
		self.record_operation(chain_id, Operation::Sign, duration, success)
	}

	fn record_broadcast(&self, chain_id: &str, duration: Duration, success: bool) {
		self.record_operation(chain_id, Operation::Broadcast, duration, success)
	}

	fn get_metrics(&self) -> AggregatedMetrics;

	/// `None` if `method` was never recorded.
	fn get_rpc_metrics(&self, method: &str) -> Option<MethodMetrics>;

	fn get_health_status(&self) -> HealthStatus;

	/// Prometheus text exposition.
	fn export(&self) -> String;

	fn reset(&self);
}

/// Builds the metrics instance selected by configuration.
pub fn create_metrics(enabled: bool) -> Arc<dyn ChainMetrics> {
	if enabled {
		Arc::new(PrometheusMetrics::new())
	} else {
		Arc::new(NoopMetrics)
	}
}

/// `total / count`, or zero when `count` is zero.
pub(crate) fn average(total: Duration, count: u64) -> Duration {
	if count == 0 {
		return Duration::ZERO;
	}
	let nanos = total.as_nanos() / u128::from(count);
	Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

pub(crate) fn rate(successful: u64, total: u64) -> f64 {
	if total == 0 {
		0.0
	} else {
		successful as f64 / total as f64
	}
}
