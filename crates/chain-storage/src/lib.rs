//! Transaction state store.
//!
//! Remembers, per transaction hash, how often a transaction was submitted,
//! when it was first seen and how far it has progressed. The broadcast path
//! consults it before touching the network, which is what makes repeated
//! broadcasts of the same signed transaction idempotent.

use async_trait::async_trait;
use chain_types::{ConfigSchema, ImplementationRegistry, TxState, TxStatus};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use implementations::file::FileStore;
pub use implementations::memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// State could not be encoded or decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The backing medium failed (I/O, permissions).
	#[error("Backend error: {0}")]
	Backend(String),
	/// Persisted state exists but cannot be read back.
	#[error("Corrupt state file {path}: {message}")]
	Corrupt { path: String, message: String },
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Keyed store of [`TxState`] records.
///
/// Implementations are safe under concurrent use and never hand out
/// references into their internal map: every read returns an owned copy.
#[async_trait]
pub trait TransactionStateStore: Send + Sync {
	/// `Ok(None)` when the hash is unknown.
	async fn get(&self, tx_hash: &str) -> Result<Option<TxState>, StorageError>;

	/// Inserts or replaces the record keyed by `state.tx_hash`.
	async fn set(&self, state: TxState) -> Result<(), StorageError>;

	async fn delete(&self, tx_hash: &str) -> Result<(), StorageError>;

	/// All records, newest `first_seen` first.
	async fn list(&self) -> Result<Vec<TxState>, StorageError>;

	/// Records with `status`, newest `first_seen` first.
	async fn list_by_status(&self, status: TxStatus) -> Result<Vec<TxState>, StorageError>;

	/// Removes records first seen more than `older_than` ago and returns
	/// how many were removed.
	async fn clean(&self, older_than: Duration) -> Result<usize, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type StoreFactory = fn(&toml::Value) -> Result<Box<dyn TransactionStateStore>, StorageError>;

pub trait StoreRegistry: ImplementationRegistry<Factory = StoreFactory> {}

/// Every store implementation, keyed by configuration name.
pub fn get_all_implementations() -> Vec<(&'static str, StoreFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

pub(crate) fn newest_first(states: &mut [TxState]) {
	states.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
}

pub(crate) fn cutoff(older_than: Duration) -> chrono::DateTime<chrono::Utc> {
	let age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
	chrono::Utc::now()
		.checked_sub_signed(age)
		.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_factories_registered() {
		let names: Vec<_> = get_all_implementations().into_iter().map(|(n, _)| n).collect();
		assert!(names.contains(&"memory"));
		assert!(names.contains(&"file"));
	}

	#[test]
	fn test_cutoff_saturates() {
		assert!(cutoff(Duration::from_secs(u64::MAX)) <= chrono::Utc::now());
	}
}
