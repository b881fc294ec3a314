//! Polling streams behind `subscribe_status` and `subscribe_fee_updates`.
//!
//! Both streams emit once immediately and then poll on a timer. Every wait,
//! and every poll in flight, races the caller's [`CancelSignal`]; once it
//! fires the stream ends without emitting again and the polling future is
//! dropped.

use crate::{AdapterError, FeeStream, StatusStream};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chain_types::{CancelSignal, FeeEstimate, TransactionStatus};
use std::future::Future;
use std::time::Duration;

/// Upper bound of the error backoff.
pub const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Poll interval once a transaction has reached a terminal status.
pub const TERMINAL_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest fee update interval a caller may request.
pub const MIN_FEE_INTERVAL: Duration = Duration::from_secs(1);

/// Timing of a status subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
	/// Delay between successful polls of a non-terminal transaction.
	pub interval: Duration,
	/// First delay after a failed poll; doubles up to `error_max`.
	pub error_initial: Duration,
	pub error_max: Duration,
	pub terminal_interval: Duration,
}

impl PollSchedule {
	pub fn new(interval: Duration, error_initial: Duration) -> Self {
		Self {
			interval,
			error_initial,
			error_max: MAX_ERROR_BACKOFF,
			terminal_interval: TERMINAL_POLL_INTERVAL,
		}
	}

	fn error_backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.error_initial)
			.with_randomization_factor(0.0)
			.with_multiplier(2.0)
			.with_max_interval(self.error_max)
			.with_max_elapsed_time(None)
			.build()
	}

	fn after(&self, status: &TransactionStatus) -> Duration {
		if status.status.is_terminal() {
			self.terminal_interval
		} else {
			self.interval
		}
	}
}

/// Waits for `delay` unless `cancel` fires first. Returns `false` when
/// cancelled.
async fn sleep_or_cancel(cancel: &mut CancelSignal, delay: Duration) -> bool {
	tokio::select! {
		_ = cancel.cancelled() => false,
		_ = tokio::time::sleep(delay) => true,
	}
}

/// Runs `fut` unless `cancel` fires first.
async fn run_or_cancel<T>(cancel: &mut CancelSignal, fut: impl Future<Output = T>) -> Option<T> {
	tokio::select! {
		_ = cancel.cancelled() => None,
		value = fut => Some(value),
	}
}

/// Emits `initial`, then every status returned by `query` that differs from
/// the last one emitted.
///
/// Failed polls are logged and retried with exponential backoff; a
/// successful poll resets it.
pub(crate) fn status_stream<F, Fut>(
	tx_hash: String,
	initial: TransactionStatus,
	mut cancel: CancelSignal,
	schedule: PollSchedule,
	mut query: F,
) -> StatusStream
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = Result<TransactionStatus, AdapterError>> + Send + 'static,
{
	Box::pin(async_stream::stream! {
		if cancel.is_cancelled() {
			return;
		}

		let mut delay = schedule.after(&initial);
		let mut last = initial.clone();
		yield initial;

		let mut backoff = schedule.error_backoff();
		loop {
			if !sleep_or_cancel(&mut cancel, delay).await {
				break;
			}
			let Some(result) = run_or_cancel(&mut cancel, query()).await else {
				break;
			};

			match result {
				Ok(status) => {
					backoff.reset();
					delay = schedule.after(&status);
					if status.same_state(&last) {
						continue;
					}
					if cancel.is_cancelled() {
						break;
					}
					tracing::debug!(
						tx_hash = %tx_hash,
						status = %status.status,
						confirmations = status.confirmations,
						"Status changed"
					);
					last = status.clone();
					yield status;
				},
				Err(err) => {
					delay = backoff.next_backoff().unwrap_or(schedule.error_max);
					tracing::warn!(
						tx_hash = %tx_hash,
						error = %err,
						retry_in = ?delay,
						"Status poll failed"
					);
				},
			}
		}

		tracing::debug!(tx_hash = %tx_hash, "Status subscription closed");
	})
}

/// Emits `first`, then whatever `tick` produces every `interval`. A tick
/// returning `None` emits nothing.
pub(crate) fn fee_stream<F, Fut>(
	first: FeeEstimate,
	mut cancel: CancelSignal,
	interval: Duration,
	mut tick: F,
) -> FeeStream
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = Option<FeeEstimate>> + Send + 'static,
{
	let interval = interval.max(MIN_FEE_INTERVAL);

	Box::pin(async_stream::stream! {
		if cancel.is_cancelled() {
			return;
		}
		yield first;

		loop {
			if !sleep_or_cancel(&mut cancel, interval).await {
				break;
			}
			let Some(next) = run_or_cancel(&mut cancel, tick()).await else {
				break;
			};
			if let Some(estimate) = next {
				if cancel.is_cancelled() {
					break;
				}
				yield estimate;
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use chain_rpc::RpcError;
	use chain_types::{cancellation, TxStatus};
	use chrono::Utc;
	use futures::StreamExt;
	use std::collections::VecDeque;
	use std::sync::{Arc, Mutex};
	use tokio::time::Instant;

	type Script = Arc<Mutex<VecDeque<Result<TransactionStatus, AdapterError>>>>;

	fn status(status: TxStatus, confirmations: u64) -> TransactionStatus {
		TransactionStatus {
			status,
			confirmations,
			..TransactionStatus::pending("0xabc")
		}
	}

	fn rpc_down() -> AdapterError {
		AdapterError::Rpc(RpcError::Transport("connection refused".into()))
	}

	/// Query that replays `answers` and records when it was polled. Once the
	/// script runs dry it keeps answering with the last status.
	fn scripted(
		answers: Vec<Result<TransactionStatus, AdapterError>>,
	) -> (
		impl FnMut() -> std::future::Ready<Result<TransactionStatus, AdapterError>> + Send + 'static,
		Arc<Mutex<Vec<Instant>>>,
	) {
		let script: Script = Arc::new(Mutex::new(answers.into()));
		let polls = Arc::new(Mutex::new(Vec::new()));
		let recorded = polls.clone();
		let query = move || {
			recorded.lock().unwrap().push(Instant::now());
			let mut script = script.lock().unwrap();
			let answer = if script.len() > 1 {
				script.pop_front().unwrap()
			} else {
				match script.front().unwrap() {
					Ok(s) => Ok(s.clone()),
					Err(_) => Err(rpc_down()),
				}
			};
			std::future::ready(answer)
		};
		(query, polls)
	}

	fn schedule() -> PollSchedule {
		PollSchedule::new(Duration::from_secs(10), Duration::from_secs(5))
	}

	#[tokio::test(start_paused = true)]
	async fn test_emits_initial_then_changes_only() {
		let (_handle, cancel) = cancellation();
		let (query, polls) = scripted(vec![
			Ok(status(TxStatus::Pending, 0)),
			Ok(status(TxStatus::Confirmed, 1)),
			Ok(status(TxStatus::Confirmed, 1)),
			Ok(status(TxStatus::Finalized, 12)),
		]);

		let stream = status_stream(
			"0xabc".into(),
			status(TxStatus::Pending, 0),
			cancel,
			schedule(),
			query,
		);
		let emitted: Vec<_> = stream.take(3).collect().await;

		let seen: Vec<_> = emitted.iter().map(|s| (s.status, s.confirmations)).collect();
		assert_eq!(
			seen,
			vec![
				(TxStatus::Pending, 0),
				(TxStatus::Confirmed, 1),
				(TxStatus::Finalized, 12)
			]
		);
		assert_eq!(polls.lock().unwrap().len(), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_errors_back_off_and_reset() {
		let (_handle, cancel) = cancellation();
		let (query, polls) = scripted(vec![
			Err(rpc_down()),
			Err(rpc_down()),
			Ok(status(TxStatus::Confirmed, 1)),
			Ok(status(TxStatus::Confirmed, 2)),
		]);
		let start = Instant::now();

		let stream = status_stream(
			"0xabc".into(),
			status(TxStatus::Pending, 0),
			cancel,
			schedule(),
			query,
		);
		let emitted: Vec<_> = stream.take(3).collect().await;
		assert_eq!(emitted[2].confirmations, 2);

		let offsets: Vec<u64> = polls
			.lock()
			.unwrap()
			.iter()
			.map(|t| t.duration_since(start).as_secs())
			.collect();
		// 10s interval, then 5s and 10s of backoff, then the interval again.
		assert_eq!(offsets, vec![10, 15, 25, 35]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_terminal_status_slows_polling() {
		let (_handle, cancel) = cancellation();
		let (query, polls) = scripted(vec![
			Ok(status(TxStatus::Finalized, 12)),
			Ok(status(TxStatus::Finalized, 13)),
		]);
		let start = Instant::now();

		let stream = status_stream(
			"0xabc".into(),
			status(TxStatus::Finalized, 12),
			cancel,
			schedule(),
			query,
		);
		let emitted: Vec<_> = stream.take(2).collect().await;
		assert_eq!(emitted[1].confirmations, 13);

		let offsets: Vec<u64> = polls
			.lock()
			.unwrap()
			.iter()
			.map(|t| t.duration_since(start).as_secs())
			.collect();
		assert_eq!(offsets, vec![60, 120]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_before_start_emits_nothing() {
		let (handle, cancel) = cancellation();
		handle.cancel();
		let (query, polls) = scripted(vec![Ok(status(TxStatus::Pending, 0))]);

		let stream = status_stream(
			"0xabc".into(),
			status(TxStatus::Pending, 0),
			cancel,
			schedule(),
			query,
		);
		let emitted: Vec<_> = stream.collect().await;
		assert!(emitted.is_empty());
		assert!(polls.lock().unwrap().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_ends_stream() {
		let (handle, cancel) = cancellation();
		let (query, _) = scripted(vec![Ok(status(TxStatus::Pending, 0))]);

		let mut stream = status_stream(
			"0xabc".into(),
			status(TxStatus::Pending, 0),
			cancel,
			schedule(),
			query,
		);
		assert!(stream.next().await.is_some());

		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(25)).await;
			handle.cancel();
		});
		assert!(stream.next().await.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn test_fee_stream_ticks_until_cancelled() {
		let (handle, cancel) = cancellation();
		let estimate = |rec: u64| FeeEstimate {
			chain_id: "bitcoin".into(),
			timestamp: Utc::now(),
			min_fee: U256::from(rec),
			recommended: U256::from(rec),
			max_fee: U256::from(rec),
			confidence: 90,
			reason: "test".into(),
			estimated_blocks: 3,
			base_fee: None,
		};

		let ticks = Arc::new(Mutex::new(0u64));
		let counter = ticks.clone();
		let mut stream = fee_stream(estimate(1), cancel, Duration::from_secs(5), move || {
			let mut n = counter.lock().unwrap();
			*n += 1;
			// Every other tick has nothing new.
			let next = (*n % 2 == 0).then(|| estimate(*n + 1));
			std::future::ready(next)
		});

		assert_eq!(stream.next().await.unwrap().recommended, U256::from(1));
		assert_eq!(stream.next().await.unwrap().recommended, U256::from(3));
		assert_eq!(*ticks.lock().unwrap(), 2);

		handle.cancel();
		assert!(stream.next().await.is_none());
	}
}
