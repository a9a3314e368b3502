//! In-memory content-addressed block store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::logging::*;
use crate::protocol::{BlockService, ProtocolError, ProtocolResult};
use crate::types::{Block, BlockStoreStats};
use crate::util;

/// Digest-keyed block map behind a single read-write lock
#[derive(Default)]
pub struct BlockStore {
	blocks: RwLock<HashMap<String, Block>>,
	max_block_size: Option<usize>,
}

impl BlockStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reject blocks larger than `max` bytes on put
	pub fn with_max_block_size(max: usize) -> Self {
		BlockStore { blocks: RwLock::new(HashMap::new()), max_block_size: Some(max) }
	}

	/// Number of distinct blocks stored
	pub async fn len(&self) -> usize {
		self.blocks.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.blocks.read().await.is_empty()
	}
}

/// Checks shared by every block store backend
pub(crate) fn check_block(block: &Block, max: Option<usize>) -> ProtocolResult<()> {
	if let Some(max) = max {
		if block.len() > max {
			return Err(ProtocolError::InvalidArgument(format!(
				"block of {} bytes exceeds maximum of {}",
				block.len(),
				max
			)));
		}
	}
	Ok(())
}

pub(crate) fn check_hash(hash: &str) -> ProtocolResult<()> {
	if !util::is_valid_hash(hash) {
		return Err(ProtocolError::InvalidArgument(format!("malformed digest: {:?}", hash)));
	}
	Ok(())
}

#[async_trait]
impl BlockService for BlockStore {
	async fn get_block(&self, hash: &str) -> ProtocolResult<Block> {
		check_hash(hash)?;
		let blocks = self.blocks.read().await;
		blocks.get(hash).cloned().ok_or_else(|| ProtocolError::NotFound { hash: hash.to_string() })
	}

	async fn put_block(&self, block: Block) -> ProtocolResult<bool> {
		check_block(&block, self.max_block_size)?;
		// Never trust a client-side digest
		let hash = block.hash();
		let mut blocks = self.blocks.write().await;
		if blocks.insert(hash.clone(), block).is_none() {
			debug!("Stored block {}", hash);
		}
		Ok(true)
	}

	async fn has_blocks(&self, hashes: &[String]) -> ProtocolResult<Vec<String>> {
		let blocks = self.blocks.read().await;
		Ok(hashes.iter().filter(|h| blocks.contains_key(h.as_str())).cloned().collect())
	}

	async fn stats(&self) -> ProtocolResult<BlockStoreStats> {
		let blocks = self.blocks.read().await;
		Ok(BlockStoreStats {
			blocks: blocks.len() as u64,
			bytes: blocks.values().map(|b| b.len() as u64).sum(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	#[tokio::test]
	async fn test_put_then_get() {
		let store = BlockStore::new();
		let block = Block::new(b"some bytes".to_vec());
		let hash = block.hash();

		assert!(store.put_block(block.clone()).await.unwrap());
		assert_eq!(store.get_block(&hash).await.unwrap(), block);
	}

	#[tokio::test]
	async fn test_get_missing_is_not_found() {
		let store = BlockStore::new();
		let hash = util::hash(b"never stored");
		match store.get_block(&hash).await {
			Err(ProtocolError::NotFound { hash: h }) => assert_eq!(h, hash),
			other => panic!("expected NotFound, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_get_malformed_digest() {
		let store = BlockStore::new();
		assert!(matches!(store.get_block("xyz").await, Err(ProtocolError::InvalidArgument(_))));
	}

	#[tokio::test]
	async fn test_put_is_idempotent() {
		let store = BlockStore::new();
		let block = Block::new(vec![42; 100]);
		store.put_block(block.clone()).await.unwrap();
		store.put_block(block).await.unwrap();
		assert_eq!(store.len().await, 1);
	}

	#[tokio::test]
	async fn test_has_blocks_returns_present_subset() {
		let store = BlockStore::new();
		let a = Block::new(b"a".to_vec());
		let b = Block::new(b"b".to_vec());
		store.put_block(a.clone()).await.unwrap();

		let present = store.has_blocks(&[a.hash(), b.hash(), "junk".to_string()]).await.unwrap();
		assert_eq!(present, vec![a.hash()]);
	}

	#[tokio::test]
	async fn test_oversized_block_rejected() {
		let store = BlockStore::with_max_block_size(4);
		let result = store.put_block(Block::new(vec![0; 5])).await;
		assert!(matches!(result, Err(ProtocolError::InvalidArgument(_))));
		assert!(store.is_empty().await);
	}

	#[tokio::test]
	async fn test_concurrent_puts() {
		let store = Arc::new(BlockStore::new());
		let mut handles = Vec::new();
		for i in 0..16u8 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				// Half the tasks write the same content
				let data = if i % 2 == 0 { vec![0u8; 8] } else { vec![i; 8] };
				store.put_block(Block::new(data)).await.unwrap();
			}));
		}
		for h in handles {
			h.await.unwrap();
		}
		assert_eq!(store.len().await, 9);
		let stats = store.stats().await.unwrap();
		assert_eq!(stats.blocks, 9);
		assert_eq!(stats.bytes, 72);
	}
}

// vim: ts=4
