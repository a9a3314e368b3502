//! Service traits defining the remote-procedure boundary
//!
//! The sync engine depends only on these traits. The stores implement them
//! directly for in-process use, and [`RpcClient`](super::client::RpcClient)
//! implements them by forwarding calls to a server over TCP.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::ProtocolError;
use crate::types::{Block, BlockStoreStats, FileInfoMap, FileMetadata};

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Content-addressed block storage
#[async_trait]
pub trait BlockService: Send + Sync {
	/// Fetch the block stored under `hash`
	async fn get_block(&self, hash: &str) -> ProtocolResult<Block>;

	/// Store `block` under the digest of its own bytes
	async fn put_block(&self, block: Block) -> ProtocolResult<bool>;

	/// Return the subset of `hashes` currently stored
	async fn has_blocks(&self, hashes: &[String]) -> ProtocolResult<Vec<String>>;

	/// Block count and stored bytes
	async fn stats(&self) -> ProtocolResult<BlockStoreStats>;
}

/// Versioned file metadata with optimistic concurrency control
#[async_trait]
pub trait MetaService: Send + Sync {
	/// Full snapshot of every known file
	async fn get_file_info_map(&self) -> ProtocolResult<FileInfoMap>;

	/// Replace the record for `meta.filename` if its version is the successor
	/// of the stored one; returns the accepted version
	async fn update_file(&self, meta: &FileMetadata) -> ProtocolResult<u64>;

	/// Address of the block store clients should use
	async fn get_block_store_addr(&self) -> ProtocolResult<String>;
}

/// Resolves a block store address to a usable service handle
#[async_trait]
pub trait BlockConnector: Send + Sync {
	async fn connect(&self, addr: &str) -> ProtocolResult<Arc<dyn BlockService>>;
}

// vim: ts=4
