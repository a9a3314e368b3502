//! Server bootstrap
//!
//! Builds the stores selected by [`ServerConfig`], binds the listener and
//! spawns one task per client connection.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::chunking::MAX_BLOCK_SIZE;
use crate::config::ServerConfig;
use crate::logging::*;
use crate::protocol::server::max_request_len;
use crate::protocol::{BlockService, MetaService, ServiceHost};
use crate::store::{BlockStore, DiskBlockStore, MetaStore};

/// Build the services hosted by a process listening on `bound`
pub fn build_host(config: &ServerConfig, bound: SocketAddr) -> Result<ServiceHost, Box<dyn Error>> {
	let blocks: Option<Arc<dyn BlockService>> = if !config.mode.hosts_blocks() {
		None
	} else if let Some(path) = &config.block_db {
		info!("Block store: redb database at {}", path.display());
		Some(Arc::new(DiskBlockStore::open(path, config.max_block_size)?))
	} else {
		info!("Block store: in memory");
		Some(Arc::new(match config.max_block_size {
			Some(max) => BlockStore::with_max_block_size(max),
			None => BlockStore::new(),
		}))
	};

	let meta: Option<Arc<dyn MetaService>> = if config.mode.hosts_meta() {
		let advertised = config.advertised_block_addr(bound);
		info!("Metadata store: advertising block store at {}", advertised);
		Some(Arc::new(MetaStore::new(advertised)))
	} else {
		None
	};

	let max_block = config.max_block_size.unwrap_or(MAX_BLOCK_SIZE);
	Ok(ServiceHost::new(meta, blocks).with_max_request_len(max_request_len(max_block)))
}

/// Bind the listener and start accepting in the background
///
/// Returns the actual bound address, so `listen_addr` may use port 0.
pub async fn bind(config: &ServerConfig) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error>> {
	config.validate()?;
	let listener = TcpListener::bind(&config.listen_addr).await?;
	let addr = listener.local_addr()?;
	let host = Arc::new(build_host(config, addr)?);
	info!("Listening on {} ({:?} mode)", addr, config.mode);

	let handle = tokio::spawn(async move {
		loop {
			match listener.accept().await {
				Ok((stream, _)) => {
					let host = host.clone();
					tokio::spawn(async move {
						if let Err(e) = host.serve_connection(stream).await {
							debug!("Connection ended with error: {}", e);
						}
					});
				}
				Err(e) => warn!("Accept failed: {}", e),
			}
		}
	});
	Ok((addr, handle))
}

/// Run a server until interrupted
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn Error>> {
	let (_, handle) = bind(&config).await?;
	tokio::select! {
		result = handle => {
			if let Err(e) = result {
				return Err(format!("server task failed: {}", e).into());
			}
		}
		_ = tokio::signal::ctrl_c() => info!("Shutting down"),
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ServiceMode;
	use crate::protocol::{MetaClient, RpcClient, DEFAULT_RPC_TIMEOUT};
	use crate::types::Block;

	fn local(mode: ServiceMode) -> ServerConfig {
		ServerConfig {
			listen_addr: "127.0.0.1:0".into(),
			block_store_addr: Some("elsewhere:1".into()),
			mode,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn test_serves_both_services() {
		let (addr, handle) = bind(&local(ServiceMode::Both)).await.unwrap();
		let client = RpcClient::new(addr.to_string(), DEFAULT_RPC_TIMEOUT);

		assert!(client.put_block(Block::new(b"abc".to_vec())).await.unwrap());
		let meta = MetaClient::new(&[addr.to_string()], DEFAULT_RPC_TIMEOUT).unwrap();
		assert_eq!(meta.get_block_store_addr().await.unwrap(), "elsewhere:1");
		handle.abort();
	}

	#[tokio::test]
	async fn test_block_only_rejects_meta_calls() {
		let (addr, handle) = bind(&local(ServiceMode::Block)).await.unwrap();
		let client = RpcClient::new(addr.to_string(), DEFAULT_RPC_TIMEOUT);

		let err = client.get_file_info_map().await.unwrap_err();
		assert_eq!(err.kind(), "UNAVAILABLE");
		handle.abort();
	}

	#[tokio::test]
	async fn test_invalid_config_refused() {
		let config = ServerConfig { mode: ServiceMode::Meta, ..local(ServiceMode::Meta) };
		let config = ServerConfig { block_store_addr: None, ..config };
		assert!(bind(&config).await.is_err());
	}
}

// vim: ts=4
