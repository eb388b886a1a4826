//! Durable storage contract for the `{current, previous}` substate pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted position of one behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
	pub current: String,
	#[serde(default)]
	pub previous: Option<String>,
}

impl PersistedState {
	pub fn new(current: impl Into<String>, previous: Option<&str>) -> Self {
		Self {
			current: current.into(),
			previous: previous.map(str::to_string),
		}
	}
}

/// Errors raised by a [`StateStorage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error on {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("malformed state document: {0}")]
	Codec(#[from] serde_json::Error),

	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

/// Read/write contract of the storage collaborator.
#[async_trait]
pub trait StateStorage: Send + Sync {
	/// Reads the last written state. `None` when nothing was ever written.
	async fn read_state(&self) -> Result<Option<PersistedState>, StorageError>;

	async fn write_state(&self, state: &PersistedState) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: StateStorage + ?Sized> StateStorage for Arc<S> {
	async fn read_state(&self) -> Result<Option<PersistedState>, StorageError> {
		(**self).read_state().await
	}

	async fn write_state(&self, state: &PersistedState) -> Result<(), StorageError> {
		(**self).write_state(state).await
	}
}

#[derive(Debug, Default)]
struct MemoryInner {
	state: Option<PersistedState>,
	writes: Vec<PersistedState>,
}

/// In-process storage. Clones share the same slot.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
	inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Storage pre-seeded with a state, as if written by an earlier activation.
	pub fn with_state(state: PersistedState) -> Self {
		let storage = Self::default();
		storage.inner.lock().state = Some(state);
		storage
	}

	/// Last written state.
	pub fn state(&self) -> Option<PersistedState> {
		self.inner.lock().state.clone()
	}

	/// Every write in order.
	pub fn writes(&self) -> Vec<PersistedState> {
		self.inner.lock().writes.clone()
	}
}

#[async_trait]
impl StateStorage for MemoryStorage {
	async fn read_state(&self) -> Result<Option<PersistedState>, StorageError> {
		Ok(self.state())
	}

	async fn write_state(&self, state: &PersistedState) -> Result<(), StorageError> {
		let mut inner = self.inner.lock();
		inner.state = Some(state.clone());
		inner.writes.push(state.clone());
		Ok(())
	}
}

/// One JSON document per actor on the local file system.
///
/// Writes go to a sibling temporary file that is renamed over the document,
/// so a reader never observes a torn write.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
	path: PathBuf,
}

impl JsonFileStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Storage for actor `id` inside `dir`.
	pub fn in_dir(dir: impl AsRef<Path>, id: &str) -> Self {
		Self::new(dir.as_ref().join(format!("{id}.json")))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, error: std::io::Error) -> StorageError {
		StorageError::Io {
			path: self.path.clone(),
			error,
		}
	}
}

#[async_trait]
impl StateStorage for JsonFileStorage {
	async fn read_state(&self) -> Result<Option<PersistedState>, StorageError> {
		let bytes = match tokio::fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(self.io_error(err)),
		};
		Ok(Some(serde_json::from_slice(&bytes)?))
	}

	async fn write_state(&self, state: &PersistedState) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent()
			&& !parent.as_os_str().is_empty()
		{
			tokio::fs::create_dir_all(parent).await.map_err(|err| self.io_error(err))?;
		}
		let bytes = serde_json::to_vec_pretty(state)?;
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, bytes).await.map_err(|err| self.io_error(err))?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|err| self.io_error(err))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[tokio::test]
	async fn memory_storage_records_every_write() {
		let storage = MemoryStorage::new();
		assert_eq!(storage.read_state().await.unwrap(), None);

		storage.write_state(&PersistedState::new("Preparing", Some("Initial"))).await.unwrap();
		storage.write_state(&PersistedState::new("Copying", Some("Preparing"))).await.unwrap();

		assert_eq!(storage.read_state().await.unwrap(), Some(PersistedState::new("Copying", Some("Preparing"))));
		assert_eq!(storage.writes().len(), 2);
	}

	#[tokio::test]
	async fn file_storage_reads_back_what_it_wrote() {
		let dir = tempfile::tempdir().unwrap();
		let storage = JsonFileStorage::in_dir(dir.path().join("nested"), "copier-1");

		assert_eq!(storage.read_state().await.unwrap(), None);

		let state = PersistedState::new("Compressing", Some("Copying"));
		storage.write_state(&state).await.unwrap();
		assert_eq!(storage.read_state().await.unwrap(), Some(state));
		assert!(!storage.path().with_extension("json.tmp").exists());
	}

	#[tokio::test]
	async fn file_storage_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		let storage = JsonFileStorage::in_dir(dir.path(), "broken");
		std::fs::write(storage.path(), b"not json").unwrap();

		assert!(matches!(storage.read_state().await, Err(StorageError::Codec(_))));
	}

	#[test]
	fn previous_defaults_to_none() {
		let state: PersistedState = serde_json::from_str(r#"{"current":"Initial"}"#).unwrap();
		assert_eq!(state, PersistedState::new("Initial", None));
	}
}
