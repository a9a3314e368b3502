//! TCP client for the block and metadata services
//!
//! Each call opens a connection, writes one request line, reads one response
//! line and closes. The whole exchange runs under a deadline; expiry becomes
//! [`ProtocolError::Timeout`], never an application error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::error::ProtocolError;
use super::messages::{encode_line, Request, Response};
use super::traits::*;
use crate::logging::*;
use crate::types::{Block, BlockStoreStats, FileInfoMap, FileMetadata};
use crate::util;

/// Default per-call deadline
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a single server address
#[derive(Debug, Clone)]
pub struct RpcClient {
	addr: String,
	timeout: Duration,
}

impl RpcClient {
	pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
		RpcClient { addr: addr.into(), timeout }
	}

	pub fn addr(&self) -> &str {
		&self.addr
	}

	/// Send `req` and wait for its response, bounded by the call deadline
	pub async fn call(&self, req: Request) -> ProtocolResult<Response> {
		let op = req.op();
		match tokio::time::timeout(self.timeout, self.round_trip(&req)).await {
			Ok(result) => result,
			Err(_) => {
				warn!("{} to {} timed out after {:?}", op, self.addr, self.timeout);
				Err(ProtocolError::Timeout { op })
			}
		}
	}

	async fn round_trip(&self, req: &Request) -> ProtocolResult<Response> {
		let stream = TcpStream::connect(&self.addr).await?;
		let (read_half, mut write_half) = stream.into_split();

		write_half.write_all(&encode_line(req)?).await?;
		write_half.flush().await?;

		let mut reader = BufReader::new(read_half);
		let mut line = String::new();
		if reader.read_line(&mut line).await? == 0 {
			return Err(ProtocolError::Io(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				format!("{} closed the connection without a response", self.addr),
			)));
		}

		match serde_json::from_str::<Response>(line.trim())? {
			Response::Err { kind, msg, current } => {
				Err(ProtocolError::from_wire(&kind, msg, current))
			}
			response => Ok(response),
		}
	}
}

fn unexpected(op: &str, response: Response) -> ProtocolError {
	ProtocolError::ProtocolViolation(format!("unexpected response to {}: {:?}", op, response))
}

#[async_trait]
impl BlockService for RpcClient {
	async fn get_block(&self, hash: &str) -> ProtocolResult<Block> {
		match self.call(Request::GetBlock { hash: hash.to_string() }).await? {
			Response::Block { data } => Ok(Block::new(util::decode_data(&data)?)),
			other => Err(unexpected("GET_BLOCK", other)),
		}
	}

	async fn put_block(&self, block: Block) -> ProtocolResult<bool> {
		let req = Request::PutBlock { data: util::encode_data(&block.data) };
		match self.call(req).await? {
			Response::Success { flag } => Ok(flag),
			other => Err(unexpected("PUT_BLOCK", other)),
		}
	}

	async fn has_blocks(&self, hashes: &[String]) -> ProtocolResult<Vec<String>> {
		match self.call(Request::HasBlocks { hashes: hashes.to_vec() }).await? {
			Response::Hashes { hashes } => Ok(hashes),
			other => Err(unexpected("HAS_BLOCKS", other)),
		}
	}

	async fn stats(&self) -> ProtocolResult<BlockStoreStats> {
		match self.call(Request::Stat).await? {
			Response::Stat { blocks, bytes } => Ok(BlockStoreStats { blocks, bytes }),
			other => Err(unexpected("STAT", other)),
		}
	}
}

#[async_trait]
impl MetaService for RpcClient {
	async fn get_file_info_map(&self) -> ProtocolResult<FileInfoMap> {
		match self.call(Request::GetFileInfoMap).await? {
			Response::FileInfoMap { files } => Ok(files),
			other => Err(unexpected("GET_FILE_INFO_MAP", other)),
		}
	}

	async fn update_file(&self, meta: &FileMetadata) -> ProtocolResult<u64> {
		match self.call(Request::UpdateFile { meta: meta.clone() }).await? {
			Response::Version { version } => Ok(version),
			other => Err(unexpected("UPDATE_FILE", other)),
		}
	}

	async fn get_block_store_addr(&self) -> ProtocolResult<String> {
		match self.call(Request::GetBlockStoreAddr).await? {
			Response::Addr { addr } => Ok(addr),
			other => Err(unexpected("GET_BLOCK_STORE_ADDR", other)),
		}
	}
}

/// Metadata client over several addresses
///
/// Calls go to the first address; transport failures move on to the next one.
/// Application errors (conflicts, rejections) are returned immediately.
pub struct MetaClient {
	servers: Vec<RpcClient>,
}

impl MetaClient {
	pub fn new(addrs: &[String], timeout: Duration) -> Result<Self, ProtocolError> {
		if addrs.is_empty() {
			return Err(ProtocolError::InvalidArgument("no metadata server address given".into()));
		}
		Ok(MetaClient { servers: addrs.iter().map(|a| RpcClient::new(a.clone(), timeout)).collect() })
	}

	async fn with_failover<'a, T, F, Fut>(&'a self, f: F) -> ProtocolResult<T>
	where
		F: Fn(&'a RpcClient) -> Fut,
		Fut: std::future::Future<Output = ProtocolResult<T>>,
	{
		let mut last_err = None;
		for server in &self.servers {
			match f(server).await {
				Err(e) if e.is_transport() => {
					warn!("Metadata server {} failed: {}", server.addr(), e);
					last_err = Some(e);
				}
				result => return result,
			}
		}
		Err(last_err.unwrap_or_else(|| ProtocolError::Unavailable("no metadata server".into())))
	}
}

#[async_trait]
impl MetaService for MetaClient {
	async fn get_file_info_map(&self) -> ProtocolResult<FileInfoMap> {
		self.with_failover(|s| s.get_file_info_map()).await
	}

	async fn update_file(&self, meta: &FileMetadata) -> ProtocolResult<u64> {
		self.with_failover(|s| s.update_file(meta)).await
	}

	async fn get_block_store_addr(&self) -> ProtocolResult<String> {
		self.with_failover(|s| s.get_block_store_addr()).await
	}
}

/// Connects to block stores over TCP
pub struct RemoteConnector {
	timeout: Duration,
}

impl RemoteConnector {
	pub fn new(timeout: Duration) -> Self {
		RemoteConnector { timeout }
	}
}

#[async_trait]
impl BlockConnector for RemoteConnector {
	async fn connect(&self, addr: &str) -> ProtocolResult<Arc<dyn BlockService>> {
		debug!("Using block store at {}", addr);
		Ok(Arc::new(RpcClient::new(addr, self.timeout)))
	}
}


// vim: ts=4
