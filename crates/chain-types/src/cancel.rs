//! Cancellation signal shared between a subscription and its caller.
//!
//! Built on a `tokio::sync::watch` channel: the caller keeps the
//! [`CancelHandle`], the subscription task observes a [`CancelSignal`].
//! Dropping the handle counts as cancellation so an abandoned subscription
//! never outlives its owner.

use std::sync::Arc;
use tokio::sync::watch;

/// Creates a linked cancellation handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
	let (tx, rx) = watch::channel(false);
	(
		CancelHandle { tx },
		CancelSignal {
			rx,
			_keepalive: None,
		},
	)
}

/// Owner side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	/// Fires the signal. Idempotent.
	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}

	/// Returns another signal observing this handle.
	pub fn signal(&self) -> CancelSignal {
		CancelSignal {
			rx: self.tx.subscribe(),
			_keepalive: None,
		}
	}
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: watch::Receiver<bool>,
	/// Sender owned by signals that have no handle (see [`CancelSignal::never`]).
	_keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
	/// A signal that never fires.
	pub fn never() -> Self {
		let (tx, rx) = watch::channel(false);
		Self {
			rx,
			_keepalive: Some(Arc::new(tx)),
		}
	}

	/// Returns true once the handle has fired or been dropped.
	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow() || self.rx.has_changed().is_err()
	}

	/// Completes when the handle fires or is dropped.
	pub async fn cancelled(&mut self) {
		loop {
			if *self.rx.borrow_and_update() {
				return;
			}
			if self.rx.changed().await.is_err() {
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_cancel_fires_signal() {
		let (handle, mut signal) = cancellation();
		assert!(!signal.is_cancelled());

		handle.cancel();
		assert!(signal.is_cancelled());
		tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_dropping_handle_cancels() {
		let (handle, mut signal) = cancellation();
		drop(handle);

		assert!(signal.is_cancelled());
		tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_pending_until_cancelled() {
		let (handle, mut signal) = cancellation();
		let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
		assert!(waited.is_err());
		drop(handle);
	}

	#[tokio::test]
	async fn test_never_signal_stays_live() {
		let mut signal = CancelSignal::never();
		assert!(!signal.is_cancelled());
		let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
		assert!(waited.is_err());
	}
}
