//! In-process metrics with Prometheus text export.
//!
//! Counters live in two concurrent maps, one keyed by RPC method and one by
//! transaction operation. Totals and averages are derived on read from the
//! per-key sums, so nothing pre-computed can drift out of step.

use crate::{
	average, rate, AggregatedMetrics, ChainMetrics, HealthState, HealthStatus, MethodMetrics,
	Operation, OperationMetrics, MAX_HEALTHY_LATENCY, MAX_SUCCESS_GAP, MIN_HEALTHY_SUCCESS_RATE,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct MethodStats {
	total: u64,
	successful: u64,
	failed: u64,
	total_duration: Duration,
	min_duration: Option<Duration>,
	max_duration: Duration,
	last_success: Option<DateTime<Utc>>,
	last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct OperationStats {
	total: u64,
	successful: u64,
	failed: u64,
	total_duration: Duration,
}

impl OperationStats {
	fn snapshot(&self) -> OperationMetrics {
		OperationMetrics {
			total: self.total,
			successful: self.successful,
			failed: self.failed,
			success_rate: rate(self.successful, self.total),
			avg_duration: average(self.total_duration, self.total),
		}
	}
}

#[derive(Debug, Default)]
pub struct PrometheusMetrics {
	methods: DashMap<String, MethodStats>,
	operations: DashMap<Operation, OperationStats>,
}

/// RPC totals summed over every method.
struct RpcTotals {
	total: u64,
	successful: u64,
	failed: u64,
	duration: Duration,
	last_success: Option<DateTime<Utc>>,
}

impl PrometheusMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	fn rpc_totals(&self) -> RpcTotals {
		let mut totals = RpcTotals {
			total: 0,
			successful: 0,
			failed: 0,
			duration: Duration::ZERO,
			last_success: None,
		};
		for entry in self.methods.iter() {
			let stats = entry.value();
			totals.total += stats.total;
			totals.successful += stats.successful;
			totals.failed += stats.failed;
			totals.duration += stats.total_duration;
			totals.last_success = totals.last_success.max(stats.last_success);
		}
		totals
	}

	fn operation(&self, op: Operation) -> OperationMetrics {
		self.operations
			.get(&op)
			.map(|s| s.snapshot())
			.unwrap_or_default()
	}

	/// Health verdict as of `now`.
	pub(crate) fn health_at(&self, now: DateTime<Utc>) -> HealthStatus {
		let totals = self.rpc_totals();
		let success_rate = rate(totals.successful, totals.total);
		let avg = average(totals.duration, totals.total);
		let since_success = totals
			.last_success
			.map(|last| (now - last).to_std().unwrap_or_default());

		let mut status = HealthStatus {
			status: HealthState::Ok,
			message: String::new(),
			checked_at: now,
			low_success_rate: totals.total > 0 && success_rate < MIN_HEALTHY_SUCCESS_RATE,
			high_latency: avg > MAX_HEALTHY_LATENCY,
			no_recent_success: since_success.is_some_and(|gap| gap > MAX_SUCCESS_GAP),
		};

		if totals.total == 0 {
			status.message = "No RPC calls recorded yet".to_string();
			return status;
		}

		if status.low_success_rate || status.high_latency || status.no_recent_success {
			let mut reasons = Vec::new();
			if status.low_success_rate {
				reasons.push(format!("low success rate ({:.1}%)", success_rate * 100.0));
			}
			if status.high_latency {
				reasons.push(format!("high latency ({:?})", avg));
			}
			if let Some(gap) = since_success.filter(|_| status.no_recent_success) {
				reasons.push(format!("no recent success ({:?} ago)", gap));
			}
			status.status = HealthState::Degraded;
			status.message = reasons.join(", ");
			return status;
		}

		status.message = format!(
			"Success rate: {:.1}%, Avg latency: {:?}",
			success_rate * 100.0,
			avg
		);
		status
	}
}

impl ChainMetrics for PrometheusMetrics {
	fn record_rpc_call(&self, method: &str, duration: Duration, success: bool) {
		let now = Utc::now();
		let mut stats = self.methods.entry(method.to_string()).or_default();
		stats.total += 1;
		stats.total_duration += duration;
		stats.min_duration = Some(stats.min_duration.map_or(duration, |min| min.min(duration)));
		stats.max_duration = stats.max_duration.max(duration);
		if success {
			stats.successful += 1;
			stats.last_success = Some(now);
		} else {
			stats.failed += 1;
			stats.last_failure = Some(now);
		}
	}

	fn record_operation(&self, chain_id: &str, op: Operation, duration: Duration, success: bool) {
		tracing::trace!(chain_id = %chain_id, operation = op.as_str(), success, ?duration, "Recorded operation");
		let mut stats = self.operations.entry(op).or_default();
		stats.total += 1;
		stats.total_duration += duration;
		if success {
			stats.successful += 1;
		} else {
			stats.failed += 1;
		}
	}

	fn get_metrics(&self) -> AggregatedMetrics {
		let totals = self.rpc_totals();
		AggregatedMetrics {
			total_rpc_calls: totals.total,
			successful_rpc_calls: totals.successful,
			failed_rpc_calls: totals.failed,
			rpc_success_rate: rate(totals.successful, totals.total),
			avg_rpc_duration: average(totals.duration, totals.total),
			last_successful_call: totals.last_success,
			build: self.operation(Operation::Build),
			sign: self.operation(Operation::Sign),
			broadcast: self.operation(Operation::Broadcast),
		}
	}

	fn get_rpc_metrics(&self, method: &str) -> Option<MethodMetrics> {
		let stats = self.methods.get(method)?;
		Some(MethodMetrics {
			method: method.to_string(),
			total_calls: stats.total,
			successful_calls: stats.successful,
			failed_calls: stats.failed,
			success_rate: rate(stats.successful, stats.total),
			avg_duration: average(stats.total_duration, stats.total),
			min_duration: stats.min_duration.unwrap_or_default(),
			max_duration: stats.max_duration,
			last_successful_call: stats.last_success,
			last_failed_call: stats.last_failure,
		})
	}

	fn get_health_status(&self) -> HealthStatus {
		self.health_at(Utc::now())
	}

	fn export(&self) -> String {
		let mut methods: Vec<(String, MethodStats)> = self
			.methods
			.iter()
			.map(|e| (e.key().clone(), e.value().clone()))
			.collect();
		methods.sort_by(|a, b| a.0.cmp(&b.0));

		let mut out = String::new();

		// Writing to a String cannot fail.
		let _ = writeln!(out, "# HELP chainadapter_rpc_calls_total Total number of RPC calls");
		let _ = writeln!(out, "# TYPE chainadapter_rpc_calls_total counter");
		for (method, stats) in &methods {
			let _ = writeln!(
				out,
				"chainadapter_rpc_calls_total{{method=\"{}\",status=\"success\"}} {}",
				method, stats.successful
			);
			let _ = writeln!(
				out,
				"chainadapter_rpc_calls_total{{method=\"{}\",status=\"failure\"}} {}",
				method, stats.failed
			);
		}
		out.push('\n');

		let _ = writeln!(out, "# HELP chainadapter_rpc_duration_seconds RPC call duration in seconds");
		let _ = writeln!(out, "# TYPE chainadapter_rpc_duration_seconds summary");
		for (method, stats) in methods.iter().filter(|(_, s)| s.total > 0) {
			let quantiles = [
				("avg", average(stats.total_duration, stats.total)),
				("min", stats.min_duration.unwrap_or_default()),
				("max", stats.max_duration),
			];
			for (quantile, value) in quantiles {
				let _ = writeln!(
					out,
					"chainadapter_rpc_duration_seconds{{method=\"{}\",quantile=\"{}\"}} {:.6}",
					method,
					quantile,
					value.as_secs_f64()
				);
			}
		}
		out.push('\n');

		let _ = writeln!(out, "# HELP chainadapter_tx_operations_total Total number of transaction operations");
		let _ = writeln!(out, "# TYPE chainadapter_tx_operations_total counter");
		for op in Operation::ALL {
			let stats = self.operation(op);
			let _ = writeln!(
				out,
				"chainadapter_tx_operations_total{{operation=\"{}\",status=\"success\"}} {}",
				op.as_str(),
				stats.successful
			);
			let _ = writeln!(
				out,
				"chainadapter_tx_operations_total{{operation=\"{}\",status=\"failure\"}} {}",
				op.as_str(),
				stats.failed
			);
		}
		out.push('\n');

		let health = self.get_health_status();
		let _ = writeln!(out, "# HELP chainadapter_health_status Health status (1=OK, 0.5=Degraded, 0=Down)");
		let _ = writeln!(out, "# TYPE chainadapter_health_status gauge");
		let _ = writeln!(out, "chainadapter_health_status {:.1}", health.status.gauge());

		out
	}

	fn reset(&self) {
		self.methods.clear();
		self.operations.clear();
	}
}
