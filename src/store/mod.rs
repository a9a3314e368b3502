//! Server-side stores
//!
//! - [`BlockStore`]: in-memory content-addressed blocks
//! - [`DiskBlockStore`]: the same contract persisted with redb
//! - [`MetaStore`]: versioned file metadata with optimistic concurrency

pub mod block_store;
pub mod disk;
pub mod meta_store;

pub use block_store::BlockStore;
pub use disk::DiskBlockStore;
pub use meta_store::MetaStore;

// vim: ts=4
