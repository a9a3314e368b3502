//! Wire message types
//!
//! Every message is a single JSON object on its own line, tagged by `cmd`.
//! Block payloads are base64 encoded.

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use crate::types::{FileInfoMap, FileMetadata};

/// Commands sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
	GetBlock {
		hash: String,
	},
	PutBlock {
		data: String,
	},
	HasBlocks {
		hashes: Vec<String>,
	},
	GetFileInfoMap,
	UpdateFile {
		meta: FileMetadata,
	},
	GetBlockStoreAddr,
	Stat,
}

impl Request {
	/// Operation name used in logs and timeout errors
	pub fn op(&self) -> &'static str {
		match self {
			Request::GetBlock { .. } => "GET_BLOCK",
			Request::PutBlock { .. } => "PUT_BLOCK",
			Request::HasBlocks { .. } => "HAS_BLOCKS",
			Request::GetFileInfoMap => "GET_FILE_INFO_MAP",
			Request::UpdateFile { .. } => "UPDATE_FILE",
			Request::GetBlockStoreAddr => "GET_BLOCK_STORE_ADDR",
			Request::Stat => "STAT",
		}
	}
}

/// Responses sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
	Block {
		data: String,
	},
	Success {
		flag: bool,
	},
	Hashes {
		hashes: Vec<String>,
	},
	FileInfoMap {
		files: FileInfoMap,
	},
	Version {
		version: u64,
	},
	Addr {
		addr: String,
	},
	Stat {
		blocks: u64,
		bytes: u64,
	},
	Err {
		kind: String,
		msg: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		current: Option<FileMetadata>,
	},
}

impl Response {
	pub fn error(e: &ProtocolError) -> Self {
		let current = match e {
			ProtocolError::VersionConflict { current, .. } => current.clone(),
			_ => None,
		};
		Response::Err { kind: e.kind().to_string(), msg: e.wire_message(), current }
	}
}

/// Encode a message as one newline-terminated line
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
	let mut line = serde_json::to_vec(msg)?;
	line.push(b'\n');
	Ok(line)
}


// vim: ts=4
