//! Error types for client-side sync operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::ProtocolError;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Remote call failed (transport, timeout or rejection)
	Protocol(ProtocolError),

	/// Local index could not be written
	Index(IndexError),

	/// Chunking a local file failed
	Chunk(ChunkError),

	/// Invalid configuration
	Config(ConfigError),

	/// I/O error
	Io(io::Error),

	/// Downloaded block does not match its digest
	HashMismatch { expected: String, actual: String },

	/// Store rejected an update but reported no current record
	ConflictWithoutRecord { filename: String },

	/// Operation aborted by user
	Aborted,

	/// Generic error message
	Other { message: String },
}

impl SyncError {
	/// Whether running the same operation again may succeed
	pub fn is_retryable(&self) -> bool {
		match self {
			SyncError::Protocol(e) => e.is_retryable(),
			SyncError::Io(_) => true,
			_ => false,
		}
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Protocol(e) => write!(f, "Remote call failed: {}", e),
			SyncError::Index(e) => write!(f, "Index error: {}", e),
			SyncError::Chunk(e) => write!(f, "Chunk error: {}", e),
			SyncError::Config(e) => write!(f, "Configuration error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::HashMismatch { expected, actual } => {
				write!(f, "Hash mismatch: expected {}, got {}", expected, actual)
			}
			SyncError::ConflictWithoutRecord { filename } => {
				write!(f, "Version conflict for {} but the store has no record of it", filename)
			}
			SyncError::Aborted => write!(f, "Operation aborted by user"),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<IndexError> for SyncError {
	fn from(e: IndexError) -> Self {
		SyncError::Index(e)
	}
}

impl From<ChunkError> for SyncError {
	fn from(e: ChunkError) -> Self {
		SyncError::Chunk(e)
	}
}

impl From<ConfigError> for SyncError {
	fn from(e: ConfigError) -> Self {
		SyncError::Config(e)
	}
}

/// Chunking-specific errors
#[derive(Debug)]
pub enum ChunkError {
	/// Failed to read block data
	ReadFailed { source: io::Error },

	/// Block size out of bounds
	InvalidBlockSize { size: usize, max: usize },
}

impl fmt::Display for ChunkError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChunkError::ReadFailed { source } => write!(f, "Failed to read block: {}", source),
			ChunkError::InvalidBlockSize { size, max } => {
				write!(f, "Block size {} must be between 1 and {}", size, max)
			}
		}
	}
}

impl Error for ChunkError {}

impl From<io::Error> for ChunkError {
	fn from(e: io::Error) -> Self {
		ChunkError::ReadFailed { source: e }
	}
}

/// Local index errors
#[derive(Debug)]
pub enum IndexError {
	/// Failed to read the index file
	LoadFailed { source: io::Error },

	/// Failed to write the index file
	SaveFailed { source: io::Error },

	/// Index line could not be parsed
	Corrupted { line: usize, message: String },

	/// Record cannot be represented in the index format
	Unrepresentable { filename: String },
}

impl fmt::Display for IndexError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IndexError::LoadFailed { source } => write!(f, "Failed to load index: {}", source),
			IndexError::SaveFailed { source } => write!(f, "Failed to save index: {}", source),
			IndexError::Corrupted { line, message } => {
				write!(f, "Index corrupted at line {}: {}", line, message)
			}
			IndexError::Unrepresentable { filename } => {
				write!(f, "Filename cannot be stored in the index: {:?}", filename)
			}
		}
	}
}

impl Error for IndexError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	ReadFailed { path: String, source: io::Error },

	/// Config file could not be parsed
	ParseFailed { path: String, message: String },

	/// A value is out of range or inconsistent
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::ReadFailed { path, source } => {
				write!(f, "Cannot read config file {}: {}", path, source)
			}
			ConfigError::ParseFailed { path, message } => {
				write!(f, "Cannot parse config file {}: {}", path, message)
			}
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
