//! Client sync engine
//!
//! One run brings a base directory and the remote stores into agreement:
//!
//! 1. load the local index
//! 2. scan and chunk the files on disk
//! 3. fetch the remote snapshot
//! 4. reconcile every filename known to any of the three
//! 5. rewrite the index
//!
//! The metadata store arbitrates every version. A push that loses a race is
//! answered with the winning record, which is then pulled.
//!
//! # Example Usage
//!
//! ```ignore
//! use blocksync::config::ClientConfig;
//! use blocksync::protocol::{MetaClient, RemoteConnector};
//! use blocksync::sync::SyncEngine;
//!
//! let meta = Arc::new(MetaClient::new(&config.meta_store_addrs, config.rpc_timeout())?);
//! let connector = Arc::new(RemoteConnector::new(config.rpc_timeout()));
//! let report = SyncEngine::new(config, meta, connector).run().await?;
//! println!("{}", report);
//! ```

pub mod plan;

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use self::plan::{plan, Action};
use crate::chunking;
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::index::LocalIndex;
use crate::logging::*;
use crate::protocol::{BlockConnector, BlockService, MetaService, ProtocolError};
use crate::types::{Block, FileInfoMap, FileMetadata, TEMP_SUFFIX};
use crate::utils::ShutdownFlag;

/// Blocks of one file fetched in parallel
const DOWNLOAD_CONCURRENCY: usize = 8;

/// Outcome of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
	/// New content accepted by the metadata store
	pub pushed: usize,
	/// Local files written from remote content
	pub pulled: usize,
	/// Local files removed because the remote record is a tombstone
	pub deleted_local: usize,
	/// Deletions accepted by the metadata store
	pub tombstoned: usize,
	/// Pushes rejected with a version conflict
	pub conflicts: usize,
	/// Files already in agreement
	pub unchanged: usize,
	/// Files that could not be reconciled, with the reason
	pub failures: Vec<(String, String)>,
}

impl SyncReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

impl fmt::Display for SyncReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} pushed, {} pulled, {} deleted locally, {} tombstoned, {} conflicts, {} unchanged, {} failed",
			self.pushed,
			self.pulled,
			self.deleted_local,
			self.tombstoned,
			self.conflicts,
			self.unchanged,
			self.failures.len()
		)
	}
}

/// Result of scanning the base directory
#[derive(Default)]
struct Scan {
	candidates: FileInfoMap,
	blocks: HashMap<String, Block>,
	/// Files present on disk that could not be read
	unreadable: Vec<(String, String)>,
}

/// State shared by every file of one run
struct Run {
	blocks: HashMap<String, Block>,
	remote: FileInfoMap,
	block_store: OnceCell<Arc<dyn BlockService>>,
}

/// How a reconciled file changed
enum Outcome {
	Pushed,
	Tombstoned,
	Unchanged,
	Pulled,
	DeletedLocal,
}

pub struct SyncEngine {
	config: ClientConfig,
	meta: Arc<dyn MetaService>,
	connector: Arc<dyn BlockConnector>,
	index: LocalIndex,
	shutdown: Option<ShutdownFlag>,
}

impl SyncEngine {
	pub fn new(
		config: ClientConfig,
		meta: Arc<dyn MetaService>,
		connector: Arc<dyn BlockConnector>,
	) -> Self {
		let index = LocalIndex::new(&config.base_dir, &config.index_filename);
		SyncEngine { config, meta, connector, index, shutdown: None }
	}

	/// Stop between files once `flag` is raised, leaving the index untouched
	pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
		self.shutdown = Some(flag);
		self
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	fn check_shutdown(&self) -> Result<(), SyncError> {
		match &self.shutdown {
			Some(flag) if flag.is_raised() => Err(SyncError::Aborted),
			_ => Ok(()),
		}
	}

	/// Run again while the failure is retryable, up to `retry_count` times
	pub async fn run_with_retries(&self) -> Result<SyncReport, SyncError> {
		let mut attempt = 0;
		loop {
			match self.run().await {
				Err(e) if e.is_retryable() && attempt < self.config.retry_count => {
					attempt += 1;
					warn!("Sync failed ({}), retrying {}/{}", e, attempt, self.config.retry_count);
					tokio::time::sleep(self.config.retry_delay()).await;
				}
				result => return result,
			}
		}
	}

	/// Perform one full sync run
	pub async fn run(&self) -> Result<SyncReport, SyncError> {
		self.config.validate()?;
		let base = &self.config.base_dir;
		info!("Syncing {}", base.display());

		let indexed = self.index.load().await;
		let scan = self.scan(&indexed).await?;
		debug!("Scanned {} files ({} distinct blocks)", scan.candidates.len(), scan.blocks.len());

		let remote = self.meta.get_file_info_map().await?;
		debug!("Remote snapshot has {} records", remote.len());

		let mut names: BTreeSet<&String> = BTreeSet::new();
		names.extend(scan.candidates.keys());
		names.extend(indexed.keys());
		names.extend(remote.keys());
		let names: Vec<String> = names.into_iter().cloned().collect();

		let run = Run { blocks: scan.blocks, remote, block_store: OnceCell::new() };
		let mut report = SyncReport::default();
		let mut next_index = FileInfoMap::new();
		let unreadable: HashMap<String, String> = scan.unreadable.into_iter().collect();

		for name in &names {
			self.check_shutdown()?;
			let prev = indexed.get(name);

			if let Some(reason) = unreadable.get(name) {
				report.failures.push((name.clone(), reason.clone()));
				if let Some(prev) = prev {
					next_index.insert(name.clone(), prev.clone());
				}
				continue;
			}

			let action = plan(scan.candidates.get(name), prev, run.remote.get(name));
			match self.execute(&run, action, prev, &mut report).await {
				Ok(Some((record, outcome))) => {
					match outcome {
						Outcome::Pushed => report.pushed += 1,
						Outcome::Tombstoned => report.tombstoned += 1,
						Outcome::Unchanged => report.unchanged += 1,
						Outcome::Pulled => report.pulled += 1,
						Outcome::DeletedLocal => report.deleted_local += 1,
					}
					next_index.insert(name.clone(), record);
				}
				Ok(None) => {}
				Err(e) => {
					warn!("Failed to sync {}: {}", name, e);
					report.failures.push((name.clone(), e.to_string()));
					if let Some(prev) = prev {
						next_index.insert(name.clone(), prev.clone());
					}
				}
			}
		}

		self.index.save(&next_index).await?;
		info!("Sync of {} done: {}", base.display(), report);
		Ok(report)
	}

	async fn execute(
		&self,
		run: &Run,
		action: Action,
		prev: Option<&FileMetadata>,
		report: &mut SyncReport,
	) -> Result<Option<(FileMetadata, Outcome)>, SyncError> {
		let (record, changed) = match action {
			Action::Nothing => return Ok(None),
			Action::Pull(record) => {
				let outcome = self.pull(run, &record).await?;
				return Ok(Some((record, outcome)));
			}
			Action::Push(record) => {
				self.upload_blocks(run, &record.block_hash_list).await?;
				(record, Outcome::Pushed)
			}
			Action::PushTombstone(record) => (record, Outcome::Tombstoned),
		};

		match self.meta.update_file(&record).await {
			Ok(version) => {
				debug!("Accepted {} at version {}", record.filename, version);
				let outcome = if prev == Some(&record) { Outcome::Unchanged } else { changed };
				Ok(Some((record, outcome)))
			}
			Err(ProtocolError::VersionConflict { filename, current }) => {
				report.conflicts += 1;
				let current = current
					.or_else(|| run.remote.get(&filename).cloned())
					.ok_or(SyncError::ConflictWithoutRecord { filename })?;
				info!("{} lost to remote {}, pulling", record, current);
				let outcome = self.pull(run, &current).await?;
				Ok(Some((current, outcome)))
			}
			Err(e) => Err(e.into()),
		}
	}

	// ========================================================================
	// SCAN
	// ========================================================================

	async fn scan(&self, indexed: &FileInfoMap) -> Result<Scan, SyncError> {
		let mut scan = Scan::default();
		let mut dir = tokio::fs::read_dir(&self.config.base_dir).await?;

		while let Some(entry) = dir.next_entry().await? {
			let name = match entry.file_name().into_string() {
				Ok(name) => name,
				Err(raw) => {
					warn!("Skipping non-UTF-8 filename {:?}", raw);
					continue;
				}
			};
			if name == self.config.index_filename {
				continue;
			}
			if name.ends_with(TEMP_SUFFIX) {
				debug!("Removing leftover temp file {}", name);
				if let Err(e) = tokio::fs::remove_file(entry.path()).await {
					warn!("Failed to remove temp file {}: {}", name, e);
				}
				continue;
			}
			match entry.file_type().await {
				Ok(file_type) if file_type.is_file() => {}
				Ok(_) => continue,
				Err(e) => {
					warn!("Cannot stat {}: {}", name, e);
					scan.unreadable.push((name, e.to_string()));
					continue;
				}
			}
			if name.contains(['\n', '\r']) {
				warn!("Skipping unrepresentable filename {:?}", name);
				continue;
			}

			let path = entry.path();
			let block_size = self.config.block_size;
			let chunked =
				tokio::task::spawn_blocking(move || chunking::chunk_file(&path, block_size))
					.await
					.map_err(|e| SyncError::Other { message: format!("chunking task failed: {}", e) })?;

			match chunked {
				Ok(chunked) => {
					let candidate = plan::candidate(&name, chunked.hashes, indexed.get(&name));
					scan.blocks.extend(chunked.blocks);
					scan.candidates.insert(name, candidate);
				}
				Err(e) => {
					warn!("Cannot read {}: {}", name, e);
					scan.unreadable.push((name, e.to_string()));
				}
			}
		}
		Ok(scan)
	}

	// ========================================================================
	// TRANSFER
	// ========================================================================

	async fn block_store(&self, run: &Run) -> Result<Arc<dyn BlockService>, SyncError> {
		let store = run
			.block_store
			.get_or_try_init(|| async move {
				let addr = self.meta.get_block_store_addr().await?;
				debug!("Block store at {}", addr);
				self.connector.connect(&addr).await
			})
			.await?;
		Ok(store.clone())
	}

	/// Upload the blocks of `hashes` the block store does not have yet
	async fn upload_blocks(&self, run: &Run, hashes: &[String]) -> Result<(), SyncError> {
		let mut seen = HashSet::new();
		let unique: Vec<String> = hashes.iter().filter(|h| seen.insert(h.as_str())).cloned().collect();
		if unique.is_empty() {
			return Ok(());
		}

		let store = self.block_store(run).await?;
		// Only digests we asked about count; a server may pad its reply
		let present: HashSet<String> = match store.has_blocks(&unique).await {
			Ok(present) => present.into_iter().filter(|h| seen.contains(h.as_str())).collect(),
			Err(e) => {
				warn!("HasBlocks failed ({}), uploading every block", e);
				HashSet::new()
			}
		};

		let mut uploaded = 0;
		for hash in unique.iter().filter(|h| !present.contains(*h)) {
			let block = run.blocks.get(hash).ok_or_else(|| SyncError::Other {
				message: format!("block {} changed during the run", hash),
			})?;
			store.put_block(block.clone()).await?;
			uploaded += 1;
		}
		debug!("Uploaded {} of {} blocks", uploaded, unique.len());
		Ok(())
	}

	/// Make the local file match `record`
	async fn pull(&self, run: &Run, record: &FileMetadata) -> Result<Outcome, SyncError> {
		let path = self.config.base_dir.join(&record.filename);

		if record.is_tombstone() {
			return match tokio::fs::remove_file(&path).await {
				Ok(()) => {
					info!("Deleted {}", record.filename);
					Ok(Outcome::DeletedLocal)
				}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Outcome::Unchanged),
				Err(e) => Err(e.into()),
			};
		}

		let blocks = self.download_blocks(run, &record.block_hash_list).await?;
		write_replacing(&path, &blocks).await?;
		info!("Pulled {}", record);
		Ok(Outcome::Pulled)
	}

	/// Fetch and verify every block of a file, in order
	async fn download_blocks(&self, run: &Run, hashes: &[String]) -> Result<Vec<Block>, SyncError> {
		if hashes.is_empty() {
			return Ok(vec![]);
		}
		let store = self.block_store(run).await?;

		stream::iter(hashes.iter().cloned())
			.map(|hash| {
				let store = store.clone();
				async move {
					let block = match run.blocks.get(&hash) {
						Some(local) => local.clone(),
						None => store.get_block(&hash).await?,
					};
					let actual = block.hash();
					if actual != hash {
						return Err(SyncError::HashMismatch { expected: hash, actual });
					}
					Ok::<Block, SyncError>(block)
				}
			})
			.buffered(DOWNLOAD_CONCURRENCY)
			.try_collect()
			.await
	}
}

/// Write `blocks` to a temp file next to `path`, then rename it into place
async fn write_replacing(path: &Path, blocks: &[Block]) -> Result<(), SyncError> {
	let mut tmp = path.as_os_str().to_os_string();
	tmp.push(TEMP_SUFFIX);
	let tmp = PathBuf::from(tmp);

	let written = async {
		let mut file = tokio::fs::File::create(&tmp).await?;
		for block in blocks {
			file.write_all(&block.data).await?;
		}
		file.sync_all().await?;
		tokio::fs::rename(&tmp, path).await?;
		Ok::<(), std::io::Error>(())
	}
	.await;

	if let Err(e) = written {
		let _ = tokio::fs::remove_file(&tmp).await;
		return Err(e.into());
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::LocalConnector;
	use crate::store::{BlockStore, MetaStore};
	use crate::util;
	use tempfile::TempDir;

	fn engine(dir: &TempDir, meta: Arc<MetaStore>, blocks: Arc<BlockStore>) -> SyncEngine {
		let config = ClientConfig {
			base_dir: dir.path().to_path_buf(),
			block_size: 4,
			..Default::default()
		};
		SyncEngine::new(config, meta, Arc::new(LocalConnector::new(blocks)))
	}

	fn stores() -> (Arc<MetaStore>, Arc<BlockStore>) {
		(Arc::new(MetaStore::new("local")), Arc::new(BlockStore::new()))
	}

	#[tokio::test]
	async fn test_scan_skips_index_and_cleans_temp() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("a"), b"hello").unwrap();
		std::fs::write(dir.path().join("index.txt"), b"").unwrap();
		std::fs::write(dir.path().join(format!("b{}", TEMP_SUFFIX)), b"junk").unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();

		let (meta, blocks) = stores();
		let scan = engine(&dir, meta, blocks).scan(&FileInfoMap::new()).await.unwrap();

		assert_eq!(scan.candidates.keys().collect::<Vec<_>>(), vec!["a"]);
		assert_eq!(scan.candidates["a"].block_hash_list.len(), 2);
		assert!(!dir.path().join(format!("b{}", TEMP_SUFFIX)).exists());
	}

	#[tokio::test]
	async fn test_download_rejects_corrupt_block() {
		// A block service that answers every request with the wrong bytes
		struct Liar;

		#[async_trait::async_trait]
		impl BlockService for Liar {
			async fn get_block(&self, _hash: &str) -> crate::protocol::ProtocolResult<Block> {
				Ok(Block::new(b"not it".to_vec()))
			}
			async fn put_block(&self, _block: Block) -> crate::protocol::ProtocolResult<bool> {
				Ok(true)
			}
			async fn has_blocks(&self, _h: &[String]) -> crate::protocol::ProtocolResult<Vec<String>> {
				Ok(vec![])
			}
			async fn stats(&self) -> crate::protocol::ProtocolResult<crate::types::BlockStoreStats> {
				Ok(Default::default())
			}
		}

		let dir = TempDir::new().unwrap();
		let meta = Arc::new(MetaStore::new("liar"));
		let wanted = FileMetadata::new("f", 1, vec![util::hash(b"data")]);
		meta.update_file(&wanted).await.unwrap();

		let config = ClientConfig { base_dir: dir.path().to_path_buf(), ..Default::default() };
		let engine = SyncEngine::new(config, meta, Arc::new(LocalConnector::new(Arc::new(Liar))));
		let report = engine.run().await.unwrap();

		assert_eq!(report.failures.len(), 1);
		assert!(report.failures[0].1.contains("Hash mismatch"));
		assert!(!dir.path().join("f").exists());
		assert!(engine.index.load().await.is_empty());
	}

	#[tokio::test]
	async fn test_shutdown_leaves_index() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("a"), b"x").unwrap();
		let (meta, blocks) = stores();

		let flag = ShutdownFlag::new();
		flag.raise();
		let engine = engine(&dir, meta.clone(), blocks).with_shutdown(flag);

		assert!(matches!(engine.run().await, Err(SyncError::Aborted)));
		assert!(!dir.path().join("index.txt").exists());
		assert!(meta.get_file_info_map().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_retries_stop_on_permanent_error() {
		let dir = TempDir::new().unwrap();
		let meta = Arc::new(MetaStore::uninitialized("local"));
		let mut engine = engine(&dir, meta, Arc::new(BlockStore::new()));
		engine.config.retry_count = 2;
		engine.config.retry_delay_ms = 1;

		// NotInitialized is retryable; all attempts fail the same way
		let err = engine.run_with_retries().await.unwrap_err();
		assert!(err.is_retryable());
	}
}

// vim: ts=4
