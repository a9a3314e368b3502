//! Request dispatch for the TCP server
//!
//! A connection carries any number of request lines; each gets exactly one
//! response line. Malformed lines are answered with an `INVALID_ARGUMENT`
//! error and the connection stays open.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::error::ProtocolError;
use super::messages::{encode_line, Request, Response};
use super::traits::*;
use crate::chunking::MAX_BLOCK_SIZE;
use crate::logging::*;
use crate::types::Block;
use crate::util;

/// Room for the JSON framing around a base64 block
const REQUEST_OVERHEAD: usize = 4096;

/// Longest request line that can carry a block of `block_size` bytes
pub fn max_request_len(block_size: usize) -> usize {
	block_size.div_ceil(3) * 4 + REQUEST_OVERHEAD
}

/// The services hosted by one server process
#[derive(Clone)]
pub struct ServiceHost {
	meta: Option<Arc<dyn MetaService>>,
	blocks: Option<Arc<dyn BlockService>>,
	max_request_len: usize,
}

impl ServiceHost {
	pub fn new(meta: Option<Arc<dyn MetaService>>, blocks: Option<Arc<dyn BlockService>>) -> Self {
		ServiceHost { meta, blocks, max_request_len: max_request_len(MAX_BLOCK_SIZE) }
	}

	/// Refuse request lines longer than `len` bytes
	pub fn with_max_request_len(mut self, len: usize) -> Self {
		self.max_request_len = len;
		self
	}

	fn meta(&self) -> ProtocolResult<&Arc<dyn MetaService>> {
		self.meta
			.as_ref()
			.ok_or_else(|| ProtocolError::Unavailable("metadata service not hosted here".into()))
	}

	fn blocks(&self) -> ProtocolResult<&Arc<dyn BlockService>> {
		self.blocks
			.as_ref()
			.ok_or_else(|| ProtocolError::Unavailable("block service not hosted here".into()))
	}

	/// Execute one request against the hosted stores
	pub async fn handle(&self, req: Request) -> Response {
		let op = req.op();
		match self.dispatch(req).await {
			Ok(response) => response,
			Err(e) => {
				match &e {
					ProtocolError::VersionConflict { .. } | ProtocolError::NotFound { .. } => {
						debug!("{} rejected: {}", op, e)
					}
					_ => warn!("{} failed: {}", op, e),
				}
				Response::error(&e)
			}
		}
	}

	async fn dispatch(&self, req: Request) -> ProtocolResult<Response> {
		match req {
			Request::GetBlock { hash } => {
				let block = self.blocks()?.get_block(&hash).await?;
				Ok(Response::Block { data: util::encode_data(&block.data) })
			}
			Request::PutBlock { data } => {
				let data = util::decode_data(&data).map_err(|e| {
					ProtocolError::InvalidArgument(format!("block data is not base64: {}", e))
				})?;
				let flag = self.blocks()?.put_block(Block::new(data)).await?;
				Ok(Response::Success { flag })
			}
			Request::HasBlocks { hashes } => {
				let hashes = self.blocks()?.has_blocks(&hashes).await?;
				Ok(Response::Hashes { hashes })
			}
			Request::Stat => {
				let stats = self.blocks()?.stats().await?;
				Ok(Response::Stat { blocks: stats.blocks, bytes: stats.bytes })
			}
			Request::GetFileInfoMap => {
				let files = self.meta()?.get_file_info_map().await?;
				Ok(Response::FileInfoMap { files })
			}
			Request::UpdateFile { meta } => {
				let version = self.meta()?.update_file(&meta).await?;
				Ok(Response::Version { version })
			}
			Request::GetBlockStoreAddr => {
				let addr = self.meta()?.get_block_store_addr().await?;
				Ok(Response::Addr { addr })
			}
		}
	}

	/// Serve one client connection until it closes
	pub async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> ProtocolResult<()> {
		let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
		debug!("Connection from {}", peer);

		let (read_half, mut write_half) = stream.into_split();
		let mut reader = BufReader::new(read_half);
		let mut line = String::new();
		let limit = self.max_request_len as u64 + 1;

		loop {
			line.clear();
			if (&mut reader).take(limit).read_line(&mut line).await? == 0 {
				break; // EOF
			}
			if line.len() > self.max_request_len {
				warn!("Request from {} exceeds {} bytes, closing", peer, self.max_request_len);
				let err = ProtocolError::InvalidArgument(format!(
					"request longer than {} bytes",
					self.max_request_len
				));
				write_response(&mut write_half, &Response::error(&err)).await?;
				break;
			}
			let trimmed = line.trim();
			if trimmed.is_empty() {
				continue;
			}

			let response = match serde_json::from_str::<Request>(trimmed) {
				Ok(req) => self.handle(req).await,
				Err(e) => {
					warn!("Malformed request from {}: {}", peer, e);
					Response::error(&ProtocolError::InvalidArgument(format!(
						"malformed request: {}",
						e
					)))
				}
			};
			write_response(&mut write_half, &response).await?;
		}

		debug!("Connection from {} closed", peer);
		Ok(())
	}
}

async fn write_response<W: AsyncWrite + Unpin>(
	writer: &mut W,
	response: &Response,
) -> ProtocolResult<()> {
	writer.write_all(&encode_line(response)?).await?;
	writer.flush().await?;
	Ok(())
}


// vim: ts=4
