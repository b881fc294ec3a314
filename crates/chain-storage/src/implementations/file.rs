//! File-backed state store.
//!
//! The whole map lives in memory and is written out as a single JSON object
//! (`tx_hash -> TxState`) after every mutation. Writes go to `<path>.tmp`
//! first, flushed to disk and renamed into place, so a crash leaves either
//! the old or the new snapshot on disk, never a truncated one.

use crate::{cutoff, newest_first, StorageError, StoreRegistry, TransactionStateStore};
use async_trait::async_trait;
use chain_types::{ConfigSchema, Field, FieldType, Schema, TxState, TxStatus, ValidationError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// JSON snapshot store for a single file path.
///
/// Owns its path exclusively within a process. Two processes pointed at the
/// same file will overwrite each other.
pub struct FileStore {
	path: PathBuf,
	states: RwLock<HashMap<String, TxState>>,
}

impl FileStore {
	/// Opens the store at `path`, loading any existing snapshot.
	///
	/// A missing file starts an empty store. A file that exists but does not
	/// parse, including a zero-length one, is reported as
	/// [`StorageError::Corrupt`] rather than discarded. Snapshots are never
	/// written empty (an empty map is `{}`), so an empty file is a lost write.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();
		let states = load_snapshot(&path)?;
		tracing::debug!(path = %path.display(), entries = states.len(), "Opened state file");
		Ok(Self {
			path,
			states: RwLock::new(states),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn temp_path(&self) -> PathBuf {
		let mut name = self.path.as_os_str().to_owned();
		name.push(".tmp");
		PathBuf::from(name)
	}

	async fn persist(&self, states: &HashMap<String, TxState>) -> Result<(), StorageError> {
		let data = serde_json::to_vec_pretty(states)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			create_private_dir(parent).await?;
		}

		let temp = self.temp_path();
		write_synced(&temp, &data).await?;
		restrict_permissions(&temp).await?;

		fs::rename(&temp, &self.path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		sync_parent_dir(&self.path).await
	}

	/// Applies `mutate` to a copy of the map, persists it and only then
	/// publishes it. The write lock is held across the disk write so
	/// snapshots land in mutation order.
	async fn update<F, R>(&self, mutate: F) -> Result<R, StorageError>
	where
		F: FnOnce(&mut HashMap<String, TxState>) -> R + Send,
		R: Send,
	{
		let mut guard = self.states.write().await;
		let mut next = guard.clone();
		let result = mutate(&mut next);
		self.persist(&next).await?;
		*guard = next;
		Ok(result)
	}
}

fn load_snapshot(path: &Path) -> Result<HashMap<String, TxState>, StorageError> {
	let data = match std::fs::read(path) {
		Ok(data) => data,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
		Err(e) => return Err(StorageError::Backend(e.to_string())),
	};

	if data.iter().all(u8::is_ascii_whitespace) {
		return Err(StorageError::Corrupt {
			path: path.display().to_string(),
			message: "snapshot is empty".to_string(),
		});
	}

	serde_json::from_slice(&data).map_err(|e| StorageError::Corrupt {
		path: path.display().to_string(),
		message: e.to_string(),
	})
}

/// Writes `data` to `path` and waits until it is on disk.
async fn write_synced(path: &Path, data: &[u8]) -> Result<(), StorageError> {
	let mut file = fs::File::create(path)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	file.write_all(data)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	file.sync_all()
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))
}

/// Makes a rename inside the parent directory durable.
async fn sync_parent_dir(path: &Path) -> Result<(), StorageError> {
	#[cfg(unix)]
	{
		let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
			Some(parent) => parent,
			None => Path::new("."),
		};
		let dir = fs::File::open(parent)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		dir.sync_all()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
	}
	#[cfg(not(unix))]
	let _ = path;
	Ok(())
}

async fn create_private_dir(dir: &Path) -> Result<(), StorageError> {
	let mut builder = fs::DirBuilder::new();
	builder.recursive(true);
	#[cfg(unix)]
	builder.mode(0o700);
	builder
		.create(dir)
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))
}

async fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
	}
	#[cfg(not(unix))]
	let _ = path;
	Ok(())
}

#[async_trait]
impl TransactionStateStore for FileStore {
	async fn get(&self, tx_hash: &str) -> Result<Option<TxState>, StorageError> {
		Ok(self.states.read().await.get(tx_hash).cloned())
	}

	async fn set(&self, state: TxState) -> Result<(), StorageError> {
		self.update(move |states| {
			states.insert(state.tx_hash.clone(), state);
		})
		.await
	}

	async fn delete(&self, tx_hash: &str) -> Result<(), StorageError> {
		let tx_hash = tx_hash.to_string();
		self.update(move |states| {
			states.remove(&tx_hash);
		})
		.await
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
		let removed = self
			.update(move |states| {
				let before = states.len();
				states.retain(|_, s| s.first_seen >= cutoff);
				before - states.len()
			})
			.await?;
		if removed > 0 {
			tracing::info!(removed, path = %self.path.display(), "Cleaned old transaction states");
		}
		Ok(removed)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStoreSchema)
	}
}

/// Configuration schema for [`FileStore`].
pub struct FileStoreSchema;

impl ConfigSchema for FileStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if s.trim().is_empty() => Err("path cannot be empty".into()),
					_ => Ok(()),
				}
			})],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory for the `file` store.
///
/// Configuration parameters:
/// - `path`: location of the JSON snapshot (required)
pub fn create_store(config: &toml::Value) -> Result<Box<dyn TransactionStateStore>, StorageError> {
	FileStoreSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("path is required".into()))?;

	Ok(Box::new(FileStore::open(path)?))
}

pub struct Registry;

impl chain_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl StoreRegistry for Registry {}
