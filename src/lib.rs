//! # blocksync - block-level file synchronization
//!
//! Files are cut into fixed-size blocks identified by their BLAKE3 digest.
//! Blocks live in a content-addressed block store; a metadata store maps each
//! filename to a versioned list of block digests and accepts only
//! successor versions, so concurrent clients converge on one history.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blocksync::config::{ClientConfig, ServerConfig};
//! use blocksync::protocol::{MetaClient, RemoteConnector};
//! use blocksync::sync::SyncEngine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (addr, _server) = blocksync::serve::bind(&ServerConfig::default()).await?;
//!
//!     let config = ClientConfig { base_dir: "./dir".into(), ..Default::default() };
//!     let meta = Arc::new(MetaClient::new(&[addr.to_string()], config.rpc_timeout())?);
//!     let connector = Arc::new(RemoteConnector::new(config.rpc_timeout()));
//!     let report = SyncEngine::new(config, meta, connector).run().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod protocol;
pub mod serve;
pub mod store;
pub mod sync;
pub mod types;
pub mod util;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{ClientConfig, ServerConfig, ServiceMode};
pub use error::{ChunkError, ConfigError, IndexError, SyncError};
pub use sync::{SyncEngine, SyncReport};
pub use types::{Block, FileInfoMap, FileMetadata};

// vim: ts=4
