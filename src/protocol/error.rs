//! Protocol error types
//!
//! One error type covers both sides of a remote call: application-level
//! rejections raised by the stores, and transport failures raised while
//! carrying the call. Rejections travel over the wire as `ERR` responses and
//! are rebuilt into the same variant on the client.

use std::fmt;
use std::io;

use crate::types::FileMetadata;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// Block lookup miss
	NotFound { hash: String },
	/// Request argument absent or malformed
	InvalidArgument(String),
	/// Optimistic concurrency rejection; carries the store's current record
	VersionConflict { filename: String, current: Option<FileMetadata> },
	/// Metadata store has no snapshot yet
	NotInitialized,
	/// Requested service is not hosted at this address
	Unavailable(String),
	/// Failure inside the remote store
	Internal(String),
	/// Call exceeded its deadline
	Timeout { op: &'static str },
	/// I/O error from the connection
	Io(io::Error),
	/// Message could not be encoded or decoded
	Codec(String),
	/// Unexpected response for the request sent
	ProtocolViolation(String),
}

impl ProtocolError {
	/// Transport-level failures may succeed on a later attempt; rejections will not
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ProtocolError::Timeout { .. }
				| ProtocolError::Io(_)
				| ProtocolError::Unavailable(_)
				| ProtocolError::NotInitialized
		)
	}

	/// True for failures of the transport itself (worth trying another server)
	pub fn is_transport(&self) -> bool {
		matches!(self, ProtocolError::Timeout { .. } | ProtocolError::Io(_))
	}

	/// Wire tag for application errors
	pub fn kind(&self) -> &'static str {
		match self {
			ProtocolError::NotFound { .. } => "NOT_FOUND",
			ProtocolError::InvalidArgument(_) => "INVALID_ARGUMENT",
			ProtocolError::VersionConflict { .. } => "VERSION_CONFLICT",
			ProtocolError::NotInitialized => "NOT_INITIALIZED",
			ProtocolError::Unavailable(_) => "UNAVAILABLE",
			_ => "INTERNAL",
		}
	}

	/// Rebuild an error from its wire form
	pub fn from_wire(kind: &str, msg: String, current: Option<FileMetadata>) -> Self {
		match kind {
			"NOT_FOUND" => ProtocolError::NotFound { hash: msg },
			"INVALID_ARGUMENT" => ProtocolError::InvalidArgument(msg),
			"VERSION_CONFLICT" => ProtocolError::VersionConflict { filename: msg, current },
			"NOT_INITIALIZED" => ProtocolError::NotInitialized,
			"UNAVAILABLE" => ProtocolError::Unavailable(msg),
			_ => ProtocolError::Internal(msg),
		}
	}

	/// Message field sent alongside [`kind`](Self::kind)
	pub fn wire_message(&self) -> String {
		match self {
			ProtocolError::NotFound { hash } => hash.clone(),
			ProtocolError::VersionConflict { filename, .. } => filename.clone(),
			ProtocolError::InvalidArgument(msg)
			| ProtocolError::Unavailable(msg)
			| ProtocolError::Internal(msg) => msg.clone(),
			other => other.to_string(),
		}
	}
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::NotFound { hash } => write!(f, "Block not found: {}", hash),
			ProtocolError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
			ProtocolError::VersionConflict { filename, current } => match current {
				Some(meta) => {
					write!(f, "Version conflict for {}: store is at version {}", filename, meta.version)
				}
				None => write!(f, "Version conflict for {}", filename),
			},
			ProtocolError::NotInitialized => write!(f, "Metadata store not initialized"),
			ProtocolError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
			ProtocolError::Internal(msg) => write!(f, "Internal store error: {}", msg),
			ProtocolError::Timeout { op } => write!(f, "{} timed out", op),
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Codec(msg) => write!(f, "Codec error: {}", msg),
			ProtocolError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Codec(e.to_string())
	}
}

impl From<base64::DecodeError> for ProtocolError {
	fn from(e: base64::DecodeError) -> Self {
		ProtocolError::Codec(e.to_string())
	}
}

impl From<redb::Error> for ProtocolError {
	fn from(e: redb::Error) -> Self {
		ProtocolError::Internal(e.to_string())
	}
}


// vim: ts=4
