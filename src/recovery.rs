//! Directory loading and backup repair
//!
//! The backup is only used when its generation equals the generation the
//! main header claims. A mismatch means the backup describes another commit
//! and repairing from it would resurrect or drop data.

use std::path::Path;

use tracing::{debug, info};

use crate::channel::ByteChannel;
use crate::directory::{Directory, DirectoryCodec};
use crate::error::{RecoveryError, Result};
use crate::format::{peek_chunk_type, read_chunk, write_chunk, ChunkType, FileHeader, HEADER_SIZE};
use crate::shadow;

/// Read and decode the directory committed in `header`.
///
/// A header that never committed (offset 0) yields the Directory chunk right
/// after the header if there is one, and an empty directory otherwise.
pub fn read_committed_directory(
    main: &mut ByteChannel,
    header: &FileHeader,
    codec: &dyn DirectoryCodec,
) -> Result<Directory> {
    if header.directory_offset == 0
        && peek_chunk_type(main, HEADER_SIZE)? != Some(ChunkType::Directory)
    {
        return Ok(Directory::new());
    }

    let offset = header.directory_location();
    let payload = read_chunk(main, offset, ChunkType::Directory)?;
    let directory = codec.decode(&payload)?;

    debug!(offset, entries = directory.len(), "loaded directory");
    Ok(directory)
}

/// Repair the main file's header and directory from the backup at `backup_path`.
///
/// The backup holds a copy of the committed header, so a main header with a
/// damaged directory offset is replaced as well. With `writable` the backup's
/// header and directory bytes are written into the main file and everything
/// after the directory is cut. Read-only callers only get the decoded state.
pub fn repair_from_backup(
    main: &mut ByteChannel,
    header: &FileHeader,
    backup_path: &Path,
    codec: &dyn DirectoryCodec,
    writable: bool,
    sync: bool,
) -> Result<(FileHeader, Directory)> {
    let snapshot = shadow::read_snapshot(backup_path, codec)?;

    if snapshot.header.version_hash != header.version_hash {
        return Err(RecoveryError::VersionMismatch {
            main: header.version_hash,
            backup: snapshot.header.version_hash,
        }
        .into());
    }

    if writable {
        snapshot.header.write_to(main)?;
        restore_directory(
            main,
            snapshot.header.directory_location(),
            &snapshot.payload,
            sync,
        )?;
        info!(
            generation = header.version_hash,
            entries = snapshot.directory.len(),
            "main directory repaired from backup"
        );
    }

    Ok((snapshot.header, snapshot.directory))
}

/// Write a directory payload at `offset` and truncate the file after it
pub fn restore_directory(
    main: &mut ByteChannel,
    offset: u64,
    payload: &[u8],
    sync: bool,
) -> Result<()> {
    let end = write_chunk(main, offset, ChunkType::Directory, payload)?;
    main.truncate(end)?;
    if sync {
        main.sync()?;
    }
    Ok(())
}
