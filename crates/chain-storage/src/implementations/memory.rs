//! In-memory state store.

use crate::{cutoff, newest_first, StorageError, StoreRegistry, TransactionStateStore};
use async_trait::async_trait;
use chain_types::{ConfigSchema, Schema, TxState, TxStatus, ValidationError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lock-guarded map that hands out clones, never references.
///
/// Contents are lost on restart, so idempotency only holds within a
/// single process lifetime.
#[derive(Default)]
pub struct MemoryStore {
	states: RwLock<HashMap<String, TxState>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl TransactionStateStore for MemoryStore {
	async fn get(&self, tx_hash: &str) -> Result<Option<TxState>, StorageError> {
		Ok(self.states.read().await.get(tx_hash).cloned())
	}

	async fn set(&self, state: TxState) -> Result<(), StorageError> {
		self.states
			.write()
			.await
			.insert(state.tx_hash.clone(), state);
		Ok(())
	}

	async fn delete(&self, tx_hash: &str) -> Result<(), StorageError> {
		self.states.write().await.remove(tx_hash);
		Ok(())
	}

	async fn list(&self) -> Result<Vec<TxState>, StorageError> {
		let mut states: Vec<TxState> = self.states.read().await.values().cloned().collect();
		newest_first(&mut states);
		Ok(states)
	}

	async fn list_by_status(&self, status: TxStatus) -> Result<Vec<TxState>, StorageError> {
		let mut states: Vec<TxState> = self
			.states
			.read()
			.await
			.values()
			.filter(|s| s.status == status)
			.cloned()
			.collect();
		newest_first(&mut states);
		Ok(states)
	}

	async fn clean(&self, older_than: Duration) -> Result<usize, StorageError> {
		let cutoff = cutoff(older_than);
		let mut states = self.states.write().await;
		let before = states.len();
		states.retain(|_, s| s.first_seen >= cutoff);
		Ok(before - states.len())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStoreSchema)
	}
}

/// The memory store takes no options.
pub struct MemoryStoreSchema;

impl ConfigSchema for MemoryStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_store(config: &toml::Value) -> Result<Box<dyn TransactionStateStore>, StorageError> {
	MemoryStoreSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStore::new()))
}

pub struct Registry;

impl chain_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl StoreRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use std::sync::Arc;

	fn state(hash: &str, status: TxStatus, age_secs: i64) -> TxState {
		let mut s = TxState::submitted(hash, "ethereum", vec![0xaa, 0xbb]);
		s.status = status;
		s.first_seen = Utc::now() - chrono::Duration::seconds(age_secs);
		s
	}

	#[tokio::test]
	async fn test_missing_is_none() {
		let store = MemoryStore::new();
		assert!(store.get("0xabc").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_returned_copies_are_detached() {
		let store = MemoryStore::new();
		store.set(state("0x1", TxStatus::Pending, 0)).await.unwrap();

		let mut copy = store.get("0x1").await.unwrap().unwrap();
		copy.raw_tx[0] = 0xff;
		copy.retry_count = 99;

		let fresh = store.get("0x1").await.unwrap().unwrap();
		assert_eq!(fresh.raw_tx, vec![0xaa, 0xbb]);
		assert_eq!(fresh.retry_count, 1);
	}

	#[tokio::test]
	async fn test_list_newest_first_and_by_status() {
		let store = MemoryStore::new();
		store.set(state("old", TxStatus::Pending, 300)).await.unwrap();
		store.set(state("new", TxStatus::Pending, 10)).await.unwrap();
		store.set(state("mid", TxStatus::Finalized, 100)).await.unwrap();

		let all: Vec<_> = store.list().await.unwrap().into_iter().map(|s| s.tx_hash).collect();
		assert_eq!(all, vec!["new", "mid", "old"]);

		let pending: Vec<_> = store
			.list_by_status(TxStatus::Pending)
			.await
			.unwrap()
			.into_iter()
			.map(|s| s.tx_hash)
			.collect();
		assert_eq!(pending, vec!["new", "old"]);
	}

	#[tokio::test]
	async fn test_clean_removes_old_entries() {
		let store = MemoryStore::new();
		store.set(state("stale", TxStatus::Finalized, 7200)).await.unwrap();
		store.set(state("fresh", TxStatus::Pending, 0)).await.unwrap();

		let removed = store.clean(Duration::from_secs(3600)).await.unwrap();
		assert_eq!(removed, 1);
		assert!(store.get("stale").await.unwrap().is_none());
		assert!(store.get("fresh").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_delete_and_overwrite() {
		let store = MemoryStore::new();
		store.set(state("0x1", TxStatus::Pending, 0)).await.unwrap();
		let mut updated = store.get("0x1").await.unwrap().unwrap();
		updated.record_retry();
		store.set(updated).await.unwrap();
		assert_eq!(store.get("0x1").await.unwrap().unwrap().retry_count, 2);

		store.delete("0x1").await.unwrap();
		store.delete("0x1").await.unwrap();
		assert!(store.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_concurrent_sets() {
		let store = Arc::new(MemoryStore::new());
		let mut handles = Vec::new();
		for i in 0..32 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store.set(state(&format!("0x{}", i), TxStatus::Pending, 0)).await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}
		assert_eq!(store.list().await.unwrap().len(), 32);
	}

	#[test]
	fn test_factory_rejects_non_table() {
		assert!(create_store(&toml::Value::Integer(1)).is_err());
		let config: toml::Value = toml::from_str("").unwrap();
		assert!(create_store(&config).is_ok());
	}
}
