//! Metrics sink that records nothing.

use crate::{AggregatedMetrics, ChainMetrics, HealthState, HealthStatus, MethodMetrics, Operation};
use chrono::Utc;
use std::time::Duration;

/// Used when metrics are disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ChainMetrics for NoopMetrics {
	fn record_rpc_call(&self, _method: &str, _duration: Duration, _success: bool) {}

	fn record_operation(&self, _chain_id: &str, _op: Operation, _duration: Duration, _success: bool) {}

	fn get_metrics(&self) -> AggregatedMetrics {
		AggregatedMetrics::default()
	}

	fn get_rpc_metrics(&self, _method: &str) -> Option<MethodMetrics> {
		None
	}

	fn get_health_status(&self) -> HealthStatus {
		HealthStatus {
			status: HealthState::Ok,
			message: "Metrics disabled".to_string(),
			checked_at: Utc::now(),
			low_success_rate: false,
			high_latency: false,
			no_recent_success: false,
		}
	}

	fn export(&self) -> String {
		String::new()
	}

	fn reset(&self) {}
}
