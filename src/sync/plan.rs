//! Reconciliation decisions
//!
//! For every filename the engine knows three optional records: the
//! candidate built from the file on disk, the local index entry and the
//! remote record. [`plan`] maps that tuple to a single [`Action`]; the
//! executor in the parent module performs it.

use crate::types::FileMetadata;

/// What to do with one filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// Upload the file's blocks and offer this record to the metadata store
	Push(FileMetadata),

	/// Offer this deletion marker to the metadata store
	PushTombstone(FileMetadata),

	/// Make the local file match this remote record
	Pull(FileMetadata),

	/// Filename unknown everywhere
	Nothing,
}

/// Choose the action for one filename
pub fn plan(
	scanned: Option<&FileMetadata>,
	indexed: Option<&FileMetadata>,
	remote: Option<&FileMetadata>,
) -> Action {
	match (scanned, indexed, remote) {
		(Some(candidate), _, _) => Action::Push(candidate.clone()),

		// Already deleted as far as we know; re-assert without bumping the version
		(None, Some(prev), _) if prev.is_tombstone() => Action::PushTombstone(prev.clone()),
		(None, Some(prev), _) => {
			Action::PushTombstone(FileMetadata::tombstone(prev.filename.clone(), prev.version + 1))
		}

		(None, None, Some(record)) => Action::Pull(record.clone()),
		(None, None, None) => Action::Nothing,
	}
}

/// Candidate record for a scanned file, versioned against its index entry
pub fn candidate(filename: &str, hashes: Vec<String>, indexed: Option<&FileMetadata>) -> FileMetadata {
	let version = match indexed {
		Some(prev) if prev.block_hash_list == hashes => prev.version,
		Some(prev) => prev.version + 1,
		None => 1,
	};
	FileMetadata::new(filename, version, hashes)
}


// vim: ts=4
