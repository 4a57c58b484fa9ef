//! Shadow (backup) file
//!
//! While a store is open for writing, `{path}~` mirrors the last committed
//! state: a copy of the main header followed by one Directory chunk at
//! `HEADER_SIZE`. Its presence at open time means the previous writable
//! session did not close cleanly.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::channel::ByteChannel;
use crate::directory::{Directory, DirectoryCodec};
use crate::error::{RecoveryError, Result};
use crate::format::{read_chunk, write_chunk, ChunkType, FileHeader, HEADER_SIZE};

/// Suffix appended to the main path to name its backup
pub const BACKUP_SUFFIX: &str = "~";

/// Backup path for a main store path ("data.store" → "data.store~")
pub fn backup_path(main: &Path) -> PathBuf {
    let mut name = OsString::from(main.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Last committed state as recorded in a backup file
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    /// Copy of the main file's committed header
    pub header: FileHeader,

    /// Encoded directory, byte-for-byte as stored
    pub payload: Vec<u8>,

    pub directory: Directory,
}

/// Writable handle on the backup file of an open store
#[derive(Debug)]
pub struct ShadowFile {
    channel: ByteChannel,
}

impl ShadowFile {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        Ok(Self {
            channel: ByteChannel::open_or_create(path)?,
        })
    }

    /// Replace the backup contents with `header` and the directory `payload`.
    ///
    /// The chunk goes in before the header, so a torn write leaves the old
    /// generation in the header and the backup is never trusted for the new one.
    pub fn record(&mut self, header: &FileHeader, payload: &[u8], sync: bool) -> Result<()> {
        let end = write_chunk(&mut self.channel, HEADER_SIZE, ChunkType::Directory, payload)?;
        self.channel.truncate(end)?;
        header.write_to(&mut self.channel)?;
        if sync {
            self.channel.sync()?;
        }
        debug!(
            path = ?self.channel.path(),
            generation = header.version_hash,
            "backup updated"
        );
        Ok(())
    }

    /// Load the recorded state through this handle
    pub fn snapshot(
        &mut self,
        codec: &dyn DirectoryCodec,
    ) -> std::result::Result<BackupSnapshot, RecoveryError> {
        load_snapshot(&mut self.channel, codec)
    }

    /// Delete the backup file, marking a clean shutdown
    pub fn remove(self) -> Result<()> {
        let path = self.channel.path().to_path_buf();
        drop(self.channel);
        fs::remove_file(&path)?;
        debug!(?path, "backup removed");
        Ok(())
    }
}

/// Load the snapshot recorded in the backup file at `path`, read-only
pub fn read_snapshot(
    path: &Path,
    codec: &dyn DirectoryCodec,
) -> std::result::Result<BackupSnapshot, RecoveryError> {
    if !path.exists() {
        return Err(RecoveryError::BackupMissing);
    }
    let mut channel = ByteChannel::open_read_only(path)
        .map_err(|e| RecoveryError::BackupHeaderInvalid(e.to_string()))?;
    load_snapshot(&mut channel, codec)
}

fn load_snapshot(
    channel: &mut ByteChannel,
    codec: &dyn DirectoryCodec,
) -> std::result::Result<BackupSnapshot, RecoveryError> {
    let header = FileHeader::read_from(channel)
        .map_err(|e| RecoveryError::BackupHeaderInvalid(e.to_string()))?;

    let payload = read_chunk(channel, HEADER_SIZE, ChunkType::Directory)
        .map_err(|e| RecoveryError::BackupDirectoryCorrupt(e.to_string()))?;

    let directory = codec
        .decode(&payload)
        .map_err(|e| RecoveryError::BackupDirectoryCorrupt(e.to_string()))?;

    Ok(BackupSnapshot {
        header,
        payload,
        directory,
    })
}
