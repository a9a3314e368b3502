//! Core data types shared by the stores, the wire protocol and the sync engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel digest marking a deleted file
pub const TOMBSTONE_HASH: &str = "0";

/// Default name of the local index file inside the base directory
pub const DEFAULT_INDEX_FILENAME: &str = "index.txt";

/// Suffix of in-flight download and index files
///
/// The scan deletes every file in the base directory ending with this suffix,
/// including one a user created under such a name.
pub const TEMP_SUFFIX: &str = ".BlKsYnC-TmP";

/// Snapshot of the metadata store, keyed by filename
pub type FileInfoMap = BTreeMap<String, FileMetadata>;

/// An immutable chunk of file content
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
	pub data: Vec<u8>,
}

impl Block {
	pub fn new(data: Vec<u8>) -> Self {
		Block { data }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Content digest of this block
	pub fn hash(&self) -> String {
		crate::util::hash(&self.data)
	}
}

impl fmt::Debug for Block {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Block").field("len", &self.data.len()).finish()
	}
}

/// Versioned description of one file as an ordered list of block digests
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FileMetadata {
	#[serde(rename = "name")]
	pub filename: String,
	#[serde(rename = "ver")]
	pub version: u64,
	#[serde(rename = "hashes")]
	pub block_hash_list: Vec<String>,
}

impl FileMetadata {
	pub fn new(filename: impl Into<String>, version: u64, block_hash_list: Vec<String>) -> Self {
		FileMetadata { filename: filename.into(), version, block_hash_list }
	}

	/// Build the deletion marker for `filename` at `version`
	pub fn tombstone(filename: impl Into<String>, version: u64) -> Self {
		FileMetadata {
			filename: filename.into(),
			version,
			block_hash_list: vec![TOMBSTONE_HASH.to_string()],
		}
	}

	pub fn is_tombstone(&self) -> bool {
		self.block_hash_list.len() == 1 && self.block_hash_list[0] == TOMBSTONE_HASH
	}
}

impl fmt::Display for FileMetadata {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_tombstone() {
			write!(f, "{} v{} (deleted)", self.filename, self.version)
		} else {
			write!(f, "{} v{} ({} blocks)", self.filename, self.version, self.block_hash_list.len())
		}
	}
}

/// Counters reported by a block store
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct BlockStoreStats {
	pub blocks: u64,
	pub bytes: u64,
}


// vim: ts=4
