//! Local index of the last synced state
//!
//! Stored as a text file in the base directory, one line per file:
//!
//! ```text
//! filename,version,hash1 hash2 hash3
//! ```
//!
//! A lone `0` in the hash field marks a tombstone; an empty hash field is an
//! empty file. Filenames may contain commas, so lines are split from the right.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::IndexError;
use crate::logging::*;
use crate::types::{FileInfoMap, FileMetadata, TEMP_SUFFIX};

/// Persistent index manager for one base directory
pub struct LocalIndex {
	path: PathBuf,
}

impl LocalIndex {
	pub fn new(base_dir: &Path, filename: &str) -> Self {
		LocalIndex { path: base_dir.join(filename) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Load the index; a missing or unreadable index is an empty one
	pub async fn load(&self) -> FileInfoMap {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!("No index at {}, starting empty", self.path.display());
				return FileInfoMap::new();
			}
			Err(e) => {
				warn!("{}; treating index as empty", IndexError::LoadFailed { source: e });
				return FileInfoMap::new();
			}
		};

		match parse_index(&contents) {
			Ok(entries) => {
				debug!("Loaded {} index entries from {}", entries.len(), self.path.display());
				entries
			}
			Err(e) => {
				warn!("{} ({}); treating index as empty", e, self.path.display());
				FileInfoMap::new()
			}
		}
	}

	/// Replace the index with `entries` (written to a temp file, then renamed)
	pub async fn save(&self, entries: &FileInfoMap) -> Result<(), IndexError> {
		let contents = format_index(entries)?;
		let mut tmp = self.path.clone().into_os_string();
		tmp.push(TEMP_SUFFIX);
		let tmp = PathBuf::from(tmp);

		tokio::fs::write(&tmp, contents).await.map_err(|e| IndexError::SaveFailed { source: e })?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|e| IndexError::SaveFailed { source: e })?;
		debug!("Saved {} index entries to {}", entries.len(), self.path.display());
		Ok(())
	}
}

/// Parse index text into records keyed by filename
pub fn parse_index(contents: &str) -> Result<FileInfoMap, IndexError> {
	let mut entries = FileInfoMap::new();
	for (n, line) in contents.lines().enumerate() {
		if line.trim().is_empty() {
			continue;
		}
		let meta = parse_line(line).map_err(|message| IndexError::Corrupted { line: n + 1, message })?;
		entries.insert(meta.filename.clone(), meta);
	}
	Ok(entries)
}

fn parse_line(line: &str) -> Result<FileMetadata, String> {
	let mut fields = line.rsplitn(3, ',');
	let hashes = fields.next().ok_or("missing hash list")?;
	let version = fields.next().ok_or("missing version")?;
	let filename = fields.next().ok_or("missing filename")?;

	if filename.is_empty() {
		return Err("empty filename".to_string());
	}
	let version = version.parse::<u64>().map_err(|e| format!("bad version {:?}: {}", version, e))?;
	let block_hash_list = hashes.split_whitespace().map(str::to_string).collect();
	Ok(FileMetadata::new(filename, version, block_hash_list))
}

/// Render records in index format, sorted by filename
pub fn format_index(entries: &FileInfoMap) -> Result<String, IndexError> {
	let mut out = String::new();
	for meta in entries.values() {
		if meta.filename.is_empty() || meta.filename.contains(['\n', '\r']) {
			return Err(IndexError::Unrepresentable { filename: meta.filename.clone() });
		}
		out.push_str(&meta.filename);
		out.push(',');
		out.push_str(&meta.version.to_string());
		out.push(',');
		out.push_str(&meta.block_hash_list.join(" "));
		out.push('\n');
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn sample() -> FileInfoMap {
		let mut entries = FileInfoMap::new();
		for meta in [
			FileMetadata::new("a.txt", 3, vec!["aa".into(), "bb".into()]),
			FileMetadata::new("empty", 1, vec![]),
			FileMetadata::tombstone("gone", 4),
			FileMetadata::new("with,comma", 2, vec!["cc".into()]),
		] {
			entries.insert(meta.filename.clone(), meta);
		}
		entries
	}

	#[test]
	fn test_format() {
		let text = format_index(&sample()).unwrap();
		assert_eq!(text, "a.txt,3,aa bb\nempty,1,\ngone,4,0\nwith,comma,2,cc\n");
	}

	#[test]
	fn test_parse_distinguishes_empty_and_tombstone() {
		let entries = parse_index("empty,1,\ngone,4,0\n").unwrap();
		assert!(entries["empty"].block_hash_list.is_empty());
		assert!(!entries["empty"].is_tombstone());
		assert!(entries["gone"].is_tombstone());
	}

	#[test]
	fn test_parse_comma_in_filename() {
		let entries = parse_index("x,y,z,7,h1 h2\n").unwrap();
		assert_eq!(entries["x,y,z"].version, 7);
		assert_eq!(entries["x,y,z"].block_hash_list, vec!["h1", "h2"]);
	}

	#[test]
	fn test_parse_rejects_garbage() {
		assert!(matches!(parse_index("nonsense\n"), Err(IndexError::Corrupted { line: 1, .. })));
		assert!(matches!(parse_index("a,1,\nb,x,\n"), Err(IndexError::Corrupted { line: 2, .. })));
	}

	#[test]
	fn test_format_rejects_newline_name() {
		let mut entries = FileInfoMap::new();
		entries.insert("a\nb".into(), FileMetadata::new("a\nb", 1, vec![]));
		assert!(format_index(&entries).is_err());
	}

	#[tokio::test]
	async fn test_save_and_load() {
		let tmp = TempDir::new().unwrap();
		let index = LocalIndex::new(tmp.path(), "index.txt");

		assert!(index.load().await.is_empty());
		index.save(&sample()).await.unwrap();
		assert_eq!(index.load().await, sample());

		// Saving replaces rather than appends
		let mut fewer = sample();
		fewer.remove("gone");
		index.save(&fewer).await.unwrap();
		assert_eq!(index.load().await, fewer);
	}

	#[tokio::test]
	async fn test_malformed_index_loads_empty() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("index.txt"), "a,notanumber,\n").unwrap();
		let index = LocalIndex::new(tmp.path(), "index.txt");
		assert!(index.load().await.is_empty());
	}
}

// vim: ts=4
