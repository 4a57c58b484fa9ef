//! Byte channel
//!
//! Thin positioned-I/O wrapper over a file handle. All integers are
//! big-endian on disk regardless of host byte order.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Seekable read/write handle on one store file
#[derive(Debug)]
pub struct ByteChannel {
    file: File,
    path: PathBuf,
}

impl ByteChannel {
    /// Open for reading and writing, creating the file if absent
    pub fn open_or_create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::wrap(file, path))
    }

    /// Open an existing file for reading only
    pub fn open_read_only(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self::wrap(file, path))
    }

    /// Create (or empty) a file for reading and writing
    pub fn create_truncated(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::wrap(file, path))
    }

    fn wrap(file: File, path: &Path) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Positioning
    // =========================================================================

    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Move to end of file and return that offset (next append position)
    pub fn seek_to_end(&mut self) -> io::Result<u64> {
        self.file.seek(SeekFrom::End(0))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fill `buf` completely; a short file yields `UnexpectedEof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Write `bytes` at end of file, returning the offset they start at
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let offset = self.seek_to_end()?;
        self.file.write_all(bytes)?;
        Ok(offset)
    }

    /// Cut the file at `offset` and leave the cursor there
    pub fn truncate(&mut self, offset: u64) -> io::Result<()> {
        self.file.set_len(offset)?;
        self.seek(offset)
    }

    /// Flush file contents to stable storage
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}
