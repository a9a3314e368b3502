//! Remote-procedure boundary
//!
//! The sync engine talks to the stores only through the traits in
//! [`traits`]. Two transports implement them:
//!
//! - in-process: the stores themselves, plus [`LocalConnector`]
//! - TCP: [`RpcClient`] / [`MetaClient`] on the client side and
//!   [`ServiceHost`] on the server side, exchanging JSON lines
//!
//! # Example Usage
//!
//! ```ignore
//! use blocksync::protocol::{MetaClient, MetaService};
//!
//! let meta = MetaClient::new(&["127.0.0.1:8081".to_string()], timeout)?;
//! let files = meta.get_file_info_map().await?;
//! ```

pub mod client;
pub mod error;
pub mod local;
pub mod messages;
pub mod server;
pub mod traits;

// Re-export public API
pub use client::{MetaClient, RemoteConnector, RpcClient, DEFAULT_RPC_TIMEOUT};
pub use error::ProtocolError;
pub use local::LocalConnector;
pub use messages::{Request, Response};
pub use server::ServiceHost;
pub use traits::{BlockConnector, BlockService, MetaService, ProtocolResult};

// vim: ts=4
