//! Idempotent broadcasting.
//!
//! Both adapter families funnel `broadcast` through [`Broadcaster`], which
//! serialises the "look up, submit, record" sequence per transaction hash.
//! Two callers racing on the same hash therefore produce one network
//! submission: the second one waits for the lock and then finds the state
//! the first one stored.

use crate::AdapterError;
use chain_rpc::RpcError;
use chain_storage::TransactionStateStore;
use chain_types::{
	normalize_hash, BroadcastReceipt, ErrorCode, SignedTransaction, TransactionStatus, TxState,
};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Broadcaster {
	chain_id: String,
	store: Arc<dyn TransactionStateStore>,
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Broadcaster {
	pub fn new(chain_id: impl Into<String>, store: Arc<dyn TransactionStateStore>) -> Self {
		Self {
			chain_id: chain_id.into(),
			store,
			locks: DashMap::new(),
		}
	}

	pub fn store(&self) -> &Arc<dyn TransactionStateStore> {
		&self.store
	}

	/// Broadcasts `signed` unless the store already records a submission.
	///
	/// `submit` sends the raw transaction and returns the hash the node
	/// acknowledged. It is called at most once, and only when the store has
	/// no prior submission for this hash. A node reply saying the
	/// transaction is already known counts as success. Nothing is stored
	/// when submission fails, so a later retry starts clean.
	pub async fn broadcast<F, Fut>(
		&self,
		signed: &SignedTransaction,
		submit: F,
	) -> Result<BroadcastReceipt, AdapterError>
	where
		F: FnOnce() -> Fut + Send,
		Fut: Future<Output = Result<String, RpcError>> + Send,
	{
		if signed.serialized_tx.is_empty() {
			return Err(AdapterError::validation(
				ErrorCode::InvalidTransaction,
				"serialized transaction is empty",
			));
		}
		if signed.chain_id() != self.chain_id {
			return Err(AdapterError::ChainMismatch {
				expected: self.chain_id.clone(),
				actual: signed.chain_id().to_string(),
			});
		}

		let slot = LockSlot::acquire(&self.locks, normalize_hash(&signed.tx_hash));
		let _guard = slot.mutex.lock().await;
		self.broadcast_locked(signed, submit).await
	}

	async fn broadcast_locked<F, Fut>(
		&self,
		signed: &SignedTransaction,
		submit: F,
	) -> Result<BroadcastReceipt, AdapterError>
	where
		F: FnOnce() -> Fut + Send,
		Fut: Future<Output = Result<String, RpcError>> + Send,
	{
		let tx_hash = &signed.tx_hash;
		let existing = self.store.get(tx_hash).await?;

		if let Some(state) = existing.as_ref().filter(|s| s.retry_count > 0) {
			tracing::debug!(
				tx_hash = %tx_hash,
				chain_id = %self.chain_id,
				retry_count = state.retry_count,
				"Transaction already broadcast, returning stored receipt"
			);
			return Ok(self.receipt(state));
		}

		let returned = match submit().await {
			Ok(hash) => hash,
			Err(err) if is_already_known(&err) => {
				tracing::info!(tx_hash = %tx_hash, error = %err, "Node already knows transaction");
				tx_hash.clone()
			},
			Err(err) => {
				tracing::warn!(
					tx_hash = %tx_hash,
					chain_id = %self.chain_id,
					error = %err,
					"Broadcast failed"
				);
				return Err(err.into());
			},
		};

		let state = match existing {
			Some(mut state) => {
				state.record_retry();
				state
			},
			None => TxState::submitted(
				tx_hash.clone(),
				self.chain_id.clone(),
				signed.serialized_tx.clone(),
			),
		};
		if !state.matches_hash(&returned) {
			return Err(AdapterError::HashMismatch {
				expected: tx_hash.clone(),
				returned,
			});
		}
		self.store.set(state.clone()).await?;

		tracing::info!(tx_hash = %tx_hash, chain_id = %self.chain_id, "Transaction broadcast");
		Ok(self.receipt(&state))
	}

	/// Moves the stored state of `status.tx_hash` forward to `status.status`.
	/// Unknown hashes and backward moves leave the store untouched.
	pub async fn reconcile(&self, status: &TransactionStatus) -> Result<(), AdapterError> {
		let Some(mut state) = self.store.get(&status.tx_hash).await? else {
			return Ok(());
		};
		if state.advance(status.status) {
			tracing::debug!(
				tx_hash = %status.tx_hash,
				status = %status.status,
				"Advanced stored transaction state"
			);
			self.store.set(state).await?;
		}
		Ok(())
	}

	fn receipt(&self, state: &TxState) -> BroadcastReceipt {
		BroadcastReceipt {
			tx_hash: state.tx_hash.clone(),
			chain_id: self.chain_id.clone(),
			submitted_at: state.last_retry,
			rpc_endpoint: None,
			status_url: None,
			initial_status: state.status,
			retry_count: state.retry_count,
		}
	}
}

/// One caller's hold on the per-hash mutex in the lock map.
///
/// Dropping the slot removes the map entry once no other caller holds it,
/// including when the broadcast future is dropped before it completes.
struct LockSlot<'a> {
	locks: &'a DashMap<String, Arc<Mutex<()>>>,
	key: String,
	mutex: Arc<Mutex<()>>,
}

impl<'a> LockSlot<'a> {
	fn acquire(locks: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
		let mutex = locks
			.entry(key.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();
		Self { locks, key, mutex }
	}
}

impl Drop for LockSlot<'_> {
	fn drop(&mut self) {
		// The map's reference plus this slot's.
		self.locks
			.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 2);
	}
}

/// Whether the node rejected the submission because it already has the
/// transaction, e.g. `already known` or `txn-already-in-mempool`.
pub(crate) fn is_already_known(err: &RpcError) -> bool {
	err.node_message()
		.map(|m| m.to_ascii_lowercase().contains("already"))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::signed_tx;
	use chain_storage::MemoryStore;
	use chain_types::TxStatus;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	fn broadcaster() -> (Broadcaster, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::new());
		(Broadcaster::new("ethereum", store.clone()), store)
	}

	#[tokio::test]
	async fn test_repeat_broadcast_submits_once() {
		let (broadcaster, store) = broadcaster();
		let signed = signed_tx("ethereum", "0xabc");
		let counter = AtomicUsize::new(0);
		let submissions = &counter;

		for _ in 0..3 {
			let receipt = broadcaster
				.broadcast(&signed, || async move {
					submissions.fetch_add(1, Ordering::SeqCst);
					Ok("0xABC".to_string())
				})
				.await
				.unwrap();
			assert_eq!(receipt.tx_hash, "0xabc");
			assert_eq!(receipt.retry_count, 1);
		}

		assert_eq!(counter.load(Ordering::SeqCst), 1);
		let state = store.get("0xabc").await.unwrap().unwrap();
		assert_eq!(state.retry_count, 1);
		assert_eq!(state.status, TxStatus::Pending);
	}

	#[tokio::test]
	async fn test_concurrent_broadcasts_submit_once() {
		let (broadcaster, _) = broadcaster();
		let broadcaster = Arc::new(broadcaster);
		let submissions = Arc::new(AtomicUsize::new(0));
		let signed = signed_tx("ethereum", "0xfeed");

		let mut handles = Vec::new();
		for _ in 0..8 {
			let broadcaster = broadcaster.clone();
			let submissions = submissions.clone();
			let signed = signed.clone();
			handles.push(tokio::spawn(async move {
				broadcaster
					.broadcast(&signed, || async move {
						submissions.fetch_add(1, Ordering::SeqCst);
						tokio::time::sleep(Duration::from_millis(20)).await;
						Ok("0xfeed".to_string())
					})
					.await
			}));
		}

		for handle in handles {
			assert_eq!(handle.await.unwrap().unwrap().tx_hash, "0xfeed");
		}
		assert_eq!(submissions.load(Ordering::SeqCst), 1);
		assert!(broadcaster.locks.is_empty());
	}

	#[tokio::test]
	async fn test_failed_submission_stores_nothing() {
		let (broadcaster, store) = broadcaster();
		let signed = signed_tx("ethereum", "0x01");

		let err = broadcaster
			.broadcast(&signed, || async {
				Err(RpcError::Transport("connection refused".into()))
			})
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::RpcUnavailable);
		assert!(store.get("0x01").await.unwrap().is_none());

		let receipt = broadcaster
			.broadcast(&signed, || async { Ok("0x01".to_string()) })
			.await
			.unwrap();
		assert_eq!(receipt.retry_count, 1);
	}

	#[tokio::test]
	async fn test_already_known_counts_as_success() {
		let (broadcaster, store) = broadcaster();
		let signed = signed_tx("ethereum", "0x02");

		let receipt = broadcaster
			.broadcast(&signed, || async {
				Err(RpcError::Rpc {
					code: -32000,
					message: "already known".into(),
				})
			})
			.await
			.unwrap();
		assert_eq!(receipt.tx_hash, "0x02");
		assert!(store.get("0x02").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_hash_mismatch_is_rejected() {
		let (broadcaster, store) = broadcaster();
		let signed = signed_tx("ethereum", "0x03");

		let err = broadcaster
			.broadcast(&signed, || async { Ok("0x04".to_string()) })
			.await
			.unwrap_err();
		assert!(matches!(err, AdapterError::HashMismatch { .. }));
		assert!(store.get("0x03").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_rejects_empty_and_foreign_transactions() {
		let (broadcaster, _) = broadcaster();

		let mut empty = signed_tx("ethereum", "0x05");
		empty.serialized_tx.clear();
		let err = broadcaster
			.broadcast(&empty, || async { Ok("0x05".to_string()) })
			.await
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidTransaction);

		let foreign = signed_tx("bitcoin", "0x06");
		let err = broadcaster
			.broadcast(&foreign, || async { Ok("0x06".to_string()) })
			.await
			.unwrap_err();
		assert!(matches!(err, AdapterError::ChainMismatch { .. }));
	}

	#[tokio::test]
	async fn test_reconcile_moves_forward_only() {
		let (broadcaster, store) = broadcaster();
		store
			.set(TxState::submitted("0x08", "ethereum", vec![1]))
			.await
			.unwrap();

		let mut status = TransactionStatus::pending("0x08");
		status.status = TxStatus::Finalized;
		broadcaster.reconcile(&status).await.unwrap();
		assert_eq!(store.get("0x08").await.unwrap().unwrap().status, TxStatus::Finalized);

		status.status = TxStatus::Pending;
		broadcaster.reconcile(&status).await.unwrap();
		assert_eq!(store.get("0x08").await.unwrap().unwrap().status, TxStatus::Finalized);

		broadcaster
			.reconcile(&TransactionStatus::pending("0xunknown"))
			.await
			.unwrap();
		assert!(store.get("0xunknown").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_stored_terminal_state_is_returned() {
		let (broadcaster, store) = broadcaster();
		let signed = signed_tx("ethereum", "0x07");
		let mut state = TxState::submitted("0x07", "ethereum", vec![1]);
		state.advance(TxStatus::Failed);
		store.set(state).await.unwrap();

		let receipt = broadcaster
			.broadcast(&signed, || async {
				Err(RpcError::Transport("must not resubmit".into()))
			})
			.await
			.unwrap();
		assert_eq!(receipt.initial_status, TxStatus::Failed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_dropped_broadcast_releases_lock() {
		let (broadcaster, store) = broadcaster();

		for i in 0..20 {
			let signed = signed_tx("ethereum", &format!("0x{:02x}", i));
			let result = tokio::time::timeout(
				Duration::from_millis(5),
				broadcaster.broadcast(&signed, || async {
					tokio::time::sleep(Duration::from_secs(10)).await;
					Ok("0x00".to_string())
				}),
			)
			.await;
			assert!(result.is_err());
		}

		assert!(broadcaster.locks.is_empty());
		assert!(store.list().await.unwrap().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_hash_spellings_share_one_lock() {
		let broadcaster = Arc::new(broadcaster().0);

		let mut handles = Vec::new();
		for hash in ["0xABC", "abc"] {
			let broadcaster = broadcaster.clone();
			let signed = signed_tx("ethereum", hash);
			handles.push(tokio::spawn(async move {
				broadcaster
					.broadcast(&signed, || async move {
						tokio::time::sleep(Duration::from_secs(1)).await;
						Ok(hash.to_lowercase())
					})
					.await
			}));
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(broadcaster.locks.len(), 1);
		assert!(broadcaster.locks.contains_key("abc"));

		for handle in handles {
			handle.await.unwrap().unwrap();
		}
		assert!(broadcaster.locks.is_empty());
	}

	#[tokio::test]
	async fn test_completed_broadcast_leaves_no_lock() {
		let (broadcaster, _) = broadcaster();
		broadcaster
			.broadcast(&signed_tx("ethereum", "0x0b"), || async { Ok("0x0B".to_string()) })
			.await
			.unwrap();
		assert!(broadcaster.locks.is_empty());
	}
}
