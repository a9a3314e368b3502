//! Versioned file metadata store
//!
//! Updates are accepted only when the candidate version is exactly one above
//! the stored version (or when the file is new). The whole check-and-set runs
//! under one write lock so two clients racing on the same base version cannot
//! both win.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::logging::*;
use crate::protocol::{MetaService, ProtocolError, ProtocolResult};
use crate::types::{FileInfoMap, FileMetadata, TOMBSTONE_HASH};
use crate::util;

pub struct MetaStore {
	/// `None` until a snapshot has been installed
	files: RwLock<Option<FileInfoMap>>,
	block_store_addr: String,
}

impl MetaStore {
	/// Create an empty, ready store
	pub fn new(block_store_addr: impl Into<String>) -> Self {
		MetaStore {
			files: RwLock::new(Some(FileInfoMap::new())),
			block_store_addr: block_store_addr.into(),
		}
	}

	/// Create a store that rejects requests until [`install`](Self::install) is called
	pub fn uninitialized(block_store_addr: impl Into<String>) -> Self {
		MetaStore { files: RwLock::new(None), block_store_addr: block_store_addr.into() }
	}

	/// Replace the whole state with `snapshot`
	pub async fn install(&self, snapshot: FileInfoMap) {
		info!("Installing metadata snapshot with {} files", snapshot.len());
		*self.files.write().await = Some(snapshot);
	}

	pub async fn is_initialized(&self) -> bool {
		self.files.read().await.is_some()
	}
}

/// Reject records the index format or flat directory model cannot hold
fn check_metadata(meta: &FileMetadata) -> ProtocolResult<()> {
	let name = &meta.filename;
	if name.is_empty() || name == "." || name == ".." {
		return Err(ProtocolError::InvalidArgument(format!("invalid filename: {:?}", name)));
	}
	if name.contains(['/', '\n', '\r']) {
		return Err(ProtocolError::InvalidArgument(format!(
			"filename contains a forbidden character: {:?}",
			name
		)));
	}
	if !meta.is_tombstone() {
		if let Some(bad) = meta.block_hash_list.iter().find(|h| !util::is_valid_hash(h)) {
			let reason = if bad == TOMBSTONE_HASH { "misplaced tombstone marker" } else { "malformed digest" };
			return Err(ProtocolError::InvalidArgument(format!("{} in {}: {:?}", reason, name, bad)));
		}
	}
	Ok(())
}

#[async_trait]
impl MetaService for MetaStore {
	async fn get_file_info_map(&self) -> ProtocolResult<FileInfoMap> {
		self.files.read().await.clone().ok_or(ProtocolError::NotInitialized)
	}

	async fn update_file(&self, meta: &FileMetadata) -> ProtocolResult<u64> {
		check_metadata(meta)?;

		let mut guard = self.files.write().await;
		let files = guard.as_mut().ok_or(ProtocolError::NotInitialized)?;

		match files.get(&meta.filename) {
			// Re-sending the stored state is a no-op, not a conflict
			Some(current) if current == meta => {
				debug!("UpdateFile {}: unchanged at version {}", meta.filename, meta.version);
				return Ok(meta.version);
			}
			Some(current) if meta.version == current.version + 1 => {}
			Some(current) => {
				debug!(
					"UpdateFile {}: rejected version {} (store at {})",
					meta.filename, meta.version, current.version
				);
				return Err(ProtocolError::VersionConflict {
					filename: meta.filename.clone(),
					current: Some(current.clone()),
				});
			}
			None => {}
		}

		debug!("UpdateFile accepted: {}", meta);
		files.insert(meta.filename.clone(), meta.clone());
		Ok(meta.version)
	}

	async fn get_block_store_addr(&self) -> ProtocolResult<String> {
		Ok(self.block_store_addr.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	fn meta(name: &str, version: u64, content: &[u8]) -> FileMetadata {
		FileMetadata::new(name, version, vec![util::hash(content)])
	}

	#[tokio::test]
	async fn test_new_file_accepted_at_any_version() {
		let store = MetaStore::new("addr");
		assert_eq!(store.update_file(&meta("a", 1, b"x")).await.unwrap(), 1);
		assert_eq!(store.update_file(&meta("b", 7, b"x")).await.unwrap(), 7);
	}

	#[tokio::test]
	async fn test_successor_version_accepted() {
		let store = MetaStore::new("addr");
		store.update_file(&meta("a", 1, b"x")).await.unwrap();
		assert_eq!(store.update_file(&meta("a", 2, b"y")).await.unwrap(), 2);

		let files = store.get_file_info_map().await.unwrap();
		assert_eq!(files["a"], meta("a", 2, b"y"));
	}

	#[tokio::test]
	async fn test_stale_and_skipping_versions_rejected() {
		let store = MetaStore::new("addr");
		store.update_file(&meta("a", 1, b"x")).await.unwrap();
		store.update_file(&meta("a", 2, b"y")).await.unwrap();

		for version in [1, 2, 4] {
			match store.update_file(&meta("a", version, b"z")).await {
				Err(ProtocolError::VersionConflict { filename, current }) => {
					assert_eq!(filename, "a");
					assert_eq!(current, Some(meta("a", 2, b"y")));
				}
				other => panic!("expected conflict for version {}, got {:?}", version, other),
			}
		}
	}

	#[tokio::test]
	async fn test_same_state_is_idempotent() {
		let store = MetaStore::new("addr");
		store.update_file(&meta("a", 1, b"x")).await.unwrap();
		assert_eq!(store.update_file(&meta("a", 1, b"x")).await.unwrap(), 1);
		assert_eq!(store.get_file_info_map().await.unwrap()["a"].version, 1);
	}

	#[tokio::test]
	async fn test_tombstone_and_empty_file() {
		let store = MetaStore::new("addr");
		store.update_file(&FileMetadata::new("e", 1, vec![])).await.unwrap();
		store.update_file(&FileMetadata::tombstone("e", 2)).await.unwrap();
		assert!(store.get_file_info_map().await.unwrap()["e"].is_tombstone());
	}

	#[tokio::test]
	async fn test_invalid_records_rejected() {
		let store = MetaStore::new("addr");
		let bad_name = FileMetadata::new("dir/a", 1, vec![]);
		assert!(matches!(store.update_file(&bad_name).await, Err(ProtocolError::InvalidArgument(_))));

		let bad_hash = FileMetadata::new("a", 1, vec!["nothex".to_string()]);
		assert!(matches!(store.update_file(&bad_hash).await, Err(ProtocolError::InvalidArgument(_))));

		let sentinel_mixed = FileMetadata::new("a", 1, vec!["0".to_string(), util::hash(b"x")]);
		assert!(store.update_file(&sentinel_mixed).await.is_err());
		assert!(store.get_file_info_map().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_uninitialized_store() {
		let store = MetaStore::uninitialized("addr");
		assert!(matches!(store.get_file_info_map().await, Err(ProtocolError::NotInitialized)));
		assert!(matches!(store.update_file(&meta("a", 1, b"x")).await, Err(ProtocolError::NotInitialized)));

		let mut snapshot = FileInfoMap::new();
		snapshot.insert("a".to_string(), meta("a", 3, b"x"));
		store.install(snapshot).await;
		assert!(store.is_initialized().await);
		assert_eq!(store.update_file(&meta("a", 4, b"y")).await.unwrap(), 4);
	}

	#[tokio::test]
	async fn test_block_store_addr() {
		let store = MetaStore::new("10.0.0.1:9000");
		assert_eq!(store.get_block_store_addr().await.unwrap(), "10.0.0.1:9000");
	}

	#[tokio::test]
	async fn test_racing_updates_single_winner() {
		let store = Arc::new(MetaStore::new("addr"));
		store.update_file(&meta("a", 1, b"base")).await.unwrap();

		let mut handles = Vec::new();
		for i in 0..8u8 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store.update_file(&meta("a", 2, &[i])).await.is_ok()
			}));
		}
		let mut winners = 0;
		for h in handles {
			if h.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
		assert_eq!(store.get_file_info_map().await.unwrap()["a"].version, 2);
	}
}

// vim: ts=4
