//! Fixed-size chunking of file contents
//!
//! A file is cut into blocks of exactly `block_size` bytes (the last one may be
//! shorter). Each block is identified by the digest of its bytes, so the ordered
//! digest list of a file changes if and only if its content changes.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek};
use std::path::Path;

use crate::error::ChunkError;
use crate::types::Block;

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Upper bound accepted for the block size (64 MiB)
pub const MAX_BLOCK_SIZE: usize = 64 << 20;

/// Lazy iterator over the blocks of a reader
pub struct Chunker<R> {
	reader: R,
	block_size: usize,
	done: bool,
}

impl<R: Read> Chunker<R> {
	pub fn new(reader: R, block_size: usize) -> Result<Self, ChunkError> {
		if block_size == 0 || block_size > MAX_BLOCK_SIZE {
			return Err(ChunkError::InvalidBlockSize { size: block_size, max: MAX_BLOCK_SIZE });
		}
		Ok(Chunker { reader, block_size, done: false })
	}

	/// Fill `buf` as far as the reader allows; returns bytes read
	fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let mut filled = 0;
		while filled < buf.len() {
			match self.reader.read(&mut buf[filled..]) {
				Ok(0) => break,
				Ok(n) => filled += n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(filled)
	}
}

impl<R: Read + Seek> Chunker<R> {
	/// Restart the sequence from the beginning of the stream
	pub fn rewind(&mut self) -> Result<(), ChunkError> {
		self.reader.rewind()?;
		self.done = false;
		Ok(())
	}
}

impl<R: Read> Iterator for Chunker<R> {
	type Item = Result<Block, ChunkError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}
		let mut buf = vec![0u8; self.block_size];
		match self.fill(&mut buf) {
			Ok(0) => {
				self.done = true;
				None
			}
			Ok(n) => {
				if n < self.block_size {
					self.done = true;
					buf.truncate(n);
				}
				Some(Ok(Block::new(buf)))
			}
			Err(e) => {
				self.done = true;
				Some(Err(e.into()))
			}
		}
	}
}

/// Result of chunking one file
#[derive(Debug, Default)]
pub struct ChunkedFile {
	/// Ordered digest list
	pub hashes: Vec<String>,
	/// Blocks keyed by digest (duplicates within the file collapse)
	pub blocks: HashMap<String, Block>,
}

/// Chunk an in-memory buffer
pub fn chunk_bytes(data: &[u8], block_size: usize) -> Result<ChunkedFile, ChunkError> {
	collect(Chunker::new(data, block_size)?)
}

/// Chunk a file on disk
pub fn chunk_file(path: &Path, block_size: usize) -> Result<ChunkedFile, ChunkError> {
	let file = fs::File::open(path)?;
	collect(Chunker::new(io::BufReader::new(file), block_size)?)
}

fn collect<R: Read>(chunker: Chunker<R>) -> Result<ChunkedFile, ChunkError> {
	let mut out = ChunkedFile::default();
	for block in chunker {
		let block = block?;
		let hash = block.hash();
		out.hashes.push(hash.clone());
		out.blocks.entry(hash).or_insert(block);
	}
	Ok(out)
}


// vim: ts=4
