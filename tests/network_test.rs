//! End-to-end sync over TCP against servers bound on ephemeral ports

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use blocksync::config::{ClientConfig, ServerConfig, ServiceMode};
use blocksync::protocol::{BlockService, MetaClient, MetaService, RemoteConnector, RpcClient};
use blocksync::serve;
use blocksync::sync::SyncEngine;
use blocksync::types::{Block, FileMetadata};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

async fn start(config: ServerConfig) -> String {
	let (addr, _handle) = serve::bind(&config).await.unwrap();
	addr.to_string()
}

fn server_config(mode: ServiceMode) -> ServerConfig {
	ServerConfig { listen_addr: "127.0.0.1:0".into(), mode, ..Default::default() }
}

fn client(dir: &TempDir, meta_addrs: &[String]) -> SyncEngine {
	let config = ClientConfig {
		base_dir: dir.path().to_path_buf(),
		block_size: 16,
		meta_store_addrs: meta_addrs.to_vec(),
		rpc_timeout_secs: 5,
		..Default::default()
	};
	let meta = Arc::new(MetaClient::new(&config.meta_store_addrs, config.rpc_timeout()).unwrap());
	SyncEngine::new(config, meta, Arc::new(RemoteConnector::new(TIMEOUT)))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_sync_between_clients_over_tcp() {
	let addr = start(server_config(ServiceMode::Both)).await;
	let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
	let contents = b"a file that spans several sixteen byte blocks".repeat(3);
	fs::write(a.path().join("notes.txt"), &contents).unwrap();

	let report = client(&a, &[addr.clone()]).run().await.unwrap();
	assert_eq!(report.pushed, 1);

	let report = client(&b, &[addr.clone()]).run().await.unwrap();
	assert_eq!(report.pulled, 1);
	assert_eq!(fs::read(b.path().join("notes.txt")).unwrap(), contents);

	fs::remove_file(b.path().join("notes.txt")).unwrap();
	client(&b, &[addr.clone()]).run().await.unwrap();
	let report = client(&a, &[addr]).run().await.unwrap();
	assert_eq!(report.deleted_local, 1);
	assert!(!a.path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_split_meta_and_block_servers() {
	let block_addr = start(server_config(ServiceMode::Block)).await;
	let meta_addr = start(ServerConfig {
		block_store_addr: Some(block_addr.clone()),
		..server_config(ServiceMode::Meta)
	})
	.await;

	let dir = TempDir::new().unwrap();
	fs::write(dir.path().join("f"), b"split deployment").unwrap();
	client(&dir, &[meta_addr]).run().await.unwrap();

	let blocks = RpcClient::new(block_addr, TIMEOUT);
	let stats = blocks.stats().await.unwrap();
	assert_eq!(stats.blocks, 1);
	assert_eq!(stats.bytes, 16);
}

#[tokio::test]
async fn test_disk_block_store_over_tcp() {
	let db_dir = TempDir::new().unwrap();
	let addr = start(ServerConfig {
		block_db: Some(db_dir.path().join("blocks.redb")),
		..server_config(ServiceMode::Both)
	})
	.await;

	let client = RpcClient::new(addr, TIMEOUT);
	let block = Block::new(b"persisted".to_vec());
	let hash = block.hash();
	assert!(client.put_block(block.clone()).await.unwrap());
	assert_eq!(client.get_block(&hash).await.unwrap(), block);
	assert_eq!(client.has_blocks(&[hash.clone(), "f".repeat(64)]).await.unwrap(), vec![hash]);
}

#[tokio::test]
async fn test_meta_client_fails_over() {
	let addr = start(server_config(ServiceMode::Both)).await;

	// Grab a free port and release it so nothing is listening there
	let dead = {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		listener.local_addr().unwrap().to_string()
	};

	let meta = MetaClient::new(&[dead, addr], TIMEOUT).unwrap();
	assert_eq!(meta.update_file(&FileMetadata::new("f", 1, vec![])).await.unwrap(), 1);
	assert_eq!(meta.get_file_info_map().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conflict_carries_current_record() {
	let addr = start(server_config(ServiceMode::Both)).await;
	let meta = RpcClient::new(addr, TIMEOUT);

	let first = FileMetadata::new("f", 1, vec![]);
	meta.update_file(&first).await.unwrap();
	let err = meta.update_file(&FileMetadata::tombstone("f", 5)).await.unwrap_err();

	match err {
		blocksync::protocol::ProtocolError::VersionConflict { filename, current } => {
			assert_eq!(filename, "f");
			assert_eq!(current, Some(first));
		}
		other => panic!("unexpected error: {}", other),
	}
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
	let addr = start(server_config(ServiceMode::Both)).await;
	let stream = TcpStream::connect(&addr).await.unwrap();
	let (read_half, mut write_half) = stream.into_split();
	let mut reader = BufReader::new(read_half);

	write_half.write_all(b"{not json}\n{\"cmd\":\"GET_BLOCK_STORE_ADDR\"}\n").await.unwrap();

	let mut line = String::new();
	reader.read_line(&mut line).await.unwrap();
	assert!(line.contains("INVALID_ARGUMENT"), "got {}", line);

	line.clear();
	reader.read_line(&mut line).await.unwrap();
	assert!(line.contains(&addr), "got {}", line);
}

// vim: ts=4
