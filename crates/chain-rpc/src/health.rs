//! Per-endpoint health tracking with a circuit breaker.
//!
//! An endpoint's circuit opens after [`FAILURE_THRESHOLD`] consecutive
//! transport failures. While open, the endpoint is skipped for
//! [`OPEN_WINDOW`] after its most recent failure; after that it is offered
//! again as a trial, and [`SUCCESS_THRESHOLD`] consecutive successes close
//! the circuit.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

pub const FAILURE_THRESHOLD: u32 = 3;
pub const SUCCESS_THRESHOLD: u32 = 2;
pub const OPEN_WINDOW: Duration = Duration::from_secs(30);

/// Snapshot of one endpoint's health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointHealth {
	pub endpoint: String,
	pub total_calls: u64,
	pub successful_calls: u64,
	pub failed_calls: u64,
	/// Weighted moving average, `(avg * 9 + latest) / 10`.
	pub avg_latency_ms: u64,
	pub last_success: Option<DateTime<Utc>>,
	pub last_failure: Option<DateTime<Utc>>,
	pub consecutive_successes: u32,
	pub consecutive_failures: u32,
	pub circuit_open: bool,
}

#[derive(Debug, Default)]
struct EndpointState {
	health: EndpointHealth,
	last_failure_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct EndpointHealthTracker {
	endpoints: DashMap<String, EndpointState>,
}

impl EndpointHealthTracker {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self, endpoint: &str) -> dashmap::mapref::one::RefMut<'_, String, EndpointState> {
		self.endpoints
			.entry(endpoint.to_string())
			.or_insert_with(|| EndpointState {
				health: EndpointHealth {
					endpoint: endpoint.to_string(),
					..Default::default()
				},
				last_failure_at: None,
			})
	}

	pub fn record_success(&self, endpoint: &str, latency: Duration) {
		let mut state = self.state(endpoint);
		let h = &mut state.health;
		let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

		h.total_calls += 1;
		h.successful_calls += 1;
		h.last_success = Some(Utc::now());
		h.avg_latency_ms = if h.avg_latency_ms == 0 {
			latency_ms
		} else {
			(h.avg_latency_ms.saturating_mul(9).saturating_add(latency_ms)) / 10
		};
		h.consecutive_failures = 0;
		h.consecutive_successes += 1;

		if h.circuit_open && h.consecutive_successes >= SUCCESS_THRESHOLD {
			h.circuit_open = false;
			tracing::info!(endpoint = %endpoint, "Circuit closed");
		}
	}

	pub fn record_failure(&self, endpoint: &str, reason: &str) {
		let mut state = self.state(endpoint);
		state.last_failure_at = Some(Instant::now());
		let h = &mut state.health;

		h.total_calls += 1;
		h.failed_calls += 1;
		h.last_failure = Some(Utc::now());
		h.consecutive_successes = 0;
		h.consecutive_failures += 1;

		if !h.circuit_open && h.consecutive_failures >= FAILURE_THRESHOLD {
			h.circuit_open = true;
			tracing::warn!(
				endpoint = %endpoint,
				failures = h.consecutive_failures,
				reason = %reason,
				"Circuit opened"
			);
		}
	}

	/// False only while the circuit is open and the last failure is recent.
	pub fn is_healthy(&self, endpoint: &str) -> bool {
		let Some(state) = self.endpoints.get(endpoint) else {
			return true;
		};
		if !state.health.circuit_open {
			return true;
		}
		state
			.last_failure_at
			.is_none_or(|at| at.elapsed() >= OPEN_WINDOW)
	}

	/// Picks the healthy endpoint with the best score,
	/// `success_rate * 0.7 + 1 / (latency_ms + 1) * 0.3`. An endpoint with
	/// no history wins outright. Falls back to the first endpoint when none
	/// is healthy.
	pub fn best_endpoint<'a>(&self, endpoints: &'a [String]) -> Option<&'a str> {
		let mut best: Option<(&'a str, f64)> = None;

		for endpoint in endpoints {
			if !self.is_healthy(endpoint) {
				continue;
			}
			let Some(state) = self.endpoints.get(endpoint.as_str()) else {
				return Some(endpoint);
			};
			let h = &state.health;
			let success_rate = if h.total_calls == 0 {
				0.0
			} else {
				h.successful_calls as f64 / h.total_calls as f64
			};
			let latency_factor = 1.0 / (h.avg_latency_ms as f64 + 1.0);
			let score = success_rate * 0.7 + latency_factor * 0.3;

			if best.is_none_or(|(_, s)| score > s) {
				best = Some((endpoint, score));
			}
		}

		best.map(|(e, _)| e)
			.or_else(|| endpoints.first().map(String::as_str))
	}

	pub fn reset(&self, endpoint: &str) {
		self.endpoints.remove(endpoint);
	}

	pub fn health(&self, endpoint: &str) -> EndpointHealth {
		self.endpoints
			.get(endpoint)
			.map(|s| s.health.clone())
			.unwrap_or_else(|| EndpointHealth {
				endpoint: endpoint.to_string(),
				..Default::default()
			})
	}
}
