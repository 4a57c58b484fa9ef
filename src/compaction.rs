//! Compaction
//!
//! Copies every live Data chunk into a fresh file followed by a single
//! Directory chunk, leaving all superseded chunks behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::channel::ByteChannel;
use crate::directory::{Directory, DirectoryCodec};
use crate::error::{CompactionError, KvError, Result};
use crate::format::{read_chunk, write_chunk, ChunkType, FileHeader, HEADER_SIZE};

/// Outcome of a compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Destination file
    pub path: PathBuf,
    /// Entries copied into the destination
    pub entries_copied: u64,
    /// Entries dropped because their Data chunk failed verification
    pub entries_skipped: u64,
    /// Size of the destination file in bytes
    pub file_size: u64,
    /// Source size minus destination size
    pub bytes_reclaimed: u64,
}

/// Write a compacted copy of `source` to `dest`.
///
/// The destination keeps the source's app-format tag and generation and
/// records zero deleted bytes. `source` is only read.
pub fn compact(
    source: &mut ByteChannel,
    header: &FileHeader,
    directory: &Directory,
    dest: &Path,
    codec: &dyn DirectoryCodec,
    sync: bool,
) -> Result<CompactionStats> {
    let cannot_create = |source: std::io::Error| CompactionError::CannotCreateDestination {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(cannot_create)?;
    }
    let mut out = ByteChannel::create_truncated(dest).map_err(cannot_create)?;

    // Step 1: Provisional header (no directory yet)
    let mut out_header = FileHeader {
        directory_offset: 0,
        deleted_length: 0,
        ..*header
    };
    out_header.write_to(&mut out)?;

    // Step 2: Copy live values back to back
    let mut cursor = HEADER_SIZE;
    let mut out_directory = Directory::new();
    let mut entries_copied = 0;
    let mut entries_skipped = 0;

    for (key, &offset) in directory {
        match read_chunk(source, offset, ChunkType::Data) {
            Ok(payload) => {
                let next = write_chunk(&mut out, cursor, ChunkType::Data, &payload)?;
                out_directory.insert(key.clone(), cursor);
                cursor = next;
                entries_copied += 1;
            }
            Err(KvError::Integrity(failure)) => {
                warn!(key = %key, offset, %failure, "skipping unreadable entry during compaction");
                entries_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    // Step 3: Directory chunk, then the final header pointing at it
    let payload = codec.encode(&out_directory)?;
    let end = write_chunk(&mut out, cursor, ChunkType::Directory, &payload)?;
    out_header.directory_offset = cursor;
    out_header.write_to(&mut out)?;

    if sync {
        out.sync()?;
    }

    let bytes_reclaimed = source.len()?.saturating_sub(end);

    info!(
        dest = ?dest,
        entries_copied,
        entries_skipped,
        bytes_reclaimed,
        "compaction finished"
    );

    Ok(CompactionStats {
        path: dest.to_path_buf(),
        entries_copied,
        entries_skipped,
        file_size: end,
        bytes_reclaimed,
    })
}
