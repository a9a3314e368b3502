//! Durable block store backed by redb
//!
//! Same contract as the in-memory store. redb serializes write transactions,
//! so no extra lock is needed; calls run on the blocking pool.

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use super::block_store::{check_block, check_hash};
use crate::logging::*;
use crate::protocol::{BlockService, ProtocolError, ProtocolResult};
use crate::types::{Block, BlockStoreStats};

/// Key: hex digest, value: raw block bytes
const BLOCKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blocks");

pub struct DiskBlockStore {
	db: Arc<redb::Database>,
	max_block_size: Option<usize>,
}

impl DiskBlockStore {
	/// Open or create the database at `path`
	pub fn open(path: &Path, max_block_size: Option<usize>) -> Result<Self, redb::Error> {
		let db = redb::Database::create(path)?;
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(BLOCKS_TABLE)?;
			write_txn.commit()?;
		}
		info!("Opened block database at {}", path.display());
		Ok(DiskBlockStore { db: Arc::new(db), max_block_size })
	}

	async fn blocking<T, F>(&self, f: F) -> ProtocolResult<T>
	where
		T: Send + 'static,
		F: FnOnce(&redb::Database) -> Result<T, redb::Error> + Send + 'static,
	{
		let db = self.db.clone();
		tokio::task::spawn_blocking(move || f(&db))
			.await
			.map_err(|e| ProtocolError::Internal(format!("block store task failed: {}", e)))?
			.map_err(ProtocolError::from)
	}
}

#[async_trait]
impl BlockService for DiskBlockStore {
	async fn get_block(&self, hash: &str) -> ProtocolResult<Block> {
		check_hash(hash)?;
		let key = hash.to_string();
		let data = self
			.blocking(move |db| {
				let read_txn = db.begin_read()?;
				let table = read_txn.open_table(BLOCKS_TABLE)?;
				let value = table.get(key.as_str())?;
				Ok(value.map(|v| v.value().to_vec()))
			})
			.await?;
		data.map(Block::new).ok_or_else(|| ProtocolError::NotFound { hash: hash.to_string() })
	}

	async fn put_block(&self, block: Block) -> ProtocolResult<bool> {
		check_block(&block, self.max_block_size)?;
		let hash = block.hash();
		self.blocking(move |db| {
			let write_txn = db.begin_write()?;
			{
				let mut table = write_txn.open_table(BLOCKS_TABLE)?;
				if table.get(hash.as_str())?.is_none() {
					table.insert(hash.as_str(), block.data.as_slice())?;
				}
			}
			write_txn.commit()?;
			Ok(true)
		})
		.await
	}

	async fn has_blocks(&self, hashes: &[String]) -> ProtocolResult<Vec<String>> {
		let hashes = hashes.to_vec();
		self.blocking(move |db| {
			let read_txn = db.begin_read()?;
			let table = read_txn.open_table(BLOCKS_TABLE)?;
			let mut present = Vec::new();
			for hash in hashes {
				if table.get(hash.as_str())?.is_some() {
					present.push(hash);
				}
			}
			Ok(present)
		})
		.await
	}

	async fn stats(&self) -> ProtocolResult<BlockStoreStats> {
		self.blocking(|db| {
			let read_txn = db.begin_read()?;
			let table = read_txn.open_table(BLOCKS_TABLE)?;
			let mut stats = BlockStoreStats::default();
			for entry in table.iter()? {
				let (_, value) = entry?;
				stats.blocks += 1;
				stats.bytes += value.value().len() as u64;
			}
			Ok(stats)
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_blocks_survive_reopen() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("blocks.db");
		let block = Block::new(b"persistent".to_vec());

		{
			let store = DiskBlockStore::open(&path, None).unwrap();
			store.put_block(block.clone()).await.unwrap();
			store.put_block(block.clone()).await.unwrap();
		}

		let store = DiskBlockStore::open(&path, None).unwrap();
		assert_eq!(store.get_block(&block.hash()).await.unwrap(), block);
		let stats = store.stats().await.unwrap();
		assert_eq!(stats.blocks, 1);
		assert_eq!(stats.bytes, 10);
	}

	#[tokio::test]
	async fn test_missing_and_subset() {
		let tmp = TempDir::new().unwrap();
		let store = DiskBlockStore::open(&tmp.path().join("b.db"), Some(16)).unwrap();
		let a = Block::new(b"a".to_vec());
		store.put_block(a.clone()).await.unwrap();

		let missing = crate::util::hash(b"b");
		assert!(matches!(store.get_block(&missing).await, Err(ProtocolError::NotFound { .. })));
		assert_eq!(store.has_blocks(&[a.hash(), missing]).await.unwrap(), vec![a.hash()]);
		assert!(store.put_block(Block::new(vec![0; 17])).await.is_err());
	}
}

// vim: ts=4
