//! Integrity verification
//!
//! Re-reads the committed state from disk and checks every chunk it
//! reaches. Never writes.

use crate::channel::ByteChannel;
use crate::directory::DirectoryCodec;
use crate::error::{IntegrityError, KvError, Result};
use crate::format::{read_chunk, ChunkType, FileHeader};
use crate::recovery::read_committed_directory;

/// One entry whose Data chunk failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub key: String,
    pub offset: u64,
    pub error: IntegrityError,
}

/// Result of checking a store file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Generation recorded in the header
    pub generation: u64,
    /// Entries in the committed directory
    pub entries_checked: usize,
    pub failures: Vec<EntryFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verify header, committed directory and every entry it names.
///
/// Header or directory failures are returned as errors; per-entry failures
/// are collected in the report.
pub fn verify(channel: &mut ByteChannel, codec: &dyn DirectoryCodec) -> Result<IntegrityReport> {
    let header = FileHeader::read_from(channel)?;
    let directory = read_committed_directory(channel, &header, codec)?;

    let mut failures = Vec::new();
    for (key, &offset) in &directory {
        match read_chunk(channel, offset, ChunkType::Data) {
            Ok(_) => {}
            Err(KvError::Integrity(error)) => failures.push(EntryFailure {
                key: key.clone(),
                offset,
                error,
            }),
            Err(e) => return Err(e),
        }
    }

    Ok(IntegrityReport {
        generation: header.version_hash,
        entries_checked: directory.len(),
        failures,
    })
}
