//! File header
//!
//! Fixed-size record at offset 0 of both the main and the backup file.

use std::io;

use bytes::{Buf, BufMut, BytesMut};

use crate::channel::ByteChannel;
use crate::error::{KvError, OpenError, Result};

/// Magic signature identifying a ShadowKV file ("SHKV")
pub const MAGIC: u32 = 0x5348_4B56;

/// Current file format version (1.0)
pub const FORMAT_VERSION: u32 = 0x0001_0000;

/// Header size: Magic (4) + FormatVer (4) + AppFormat (4) + Reserved (4)
/// + VersionHash (8) + DirectoryOffset (8) + DeletedLength (8) = 40 bytes
pub const HEADER_SIZE: u64 = 40;

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Caller-supplied tag, passed through untouched
    pub app_format_version: u32,

    /// Generation counter, incremented once per commit
    pub version_hash: u64,

    /// Offset of the last committed Directory chunk (0 = none yet)
    pub directory_offset: u64,

    /// Bytes held by superseded chunks
    pub deleted_length: u64,
}

impl FileHeader {
    /// Header for a brand-new store
    pub fn new(app_format_version: u32) -> Self {
        Self {
            app_format_version,
            version_hash: 0,
            directory_offset: 0,
            deleted_length: 0,
        }
    }

    /// Serialize to the fixed 40-byte big-endian layout
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_u32(MAGIC);
        buf.put_u32(FORMAT_VERSION);
        buf.put_u32(self.app_format_version);
        buf.put_u32(0); // reserved
        buf.put_u64(self.version_hash);
        buf.put_u64(self.directory_offset);
        buf.put_u64(self.deleted_length);
        buf
    }

    /// Parse a header from exactly `HEADER_SIZE` bytes
    pub fn decode(mut raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE as usize {
            return Err(invalid(format!(
                "expected {} header bytes, got {}",
                HEADER_SIZE,
                raw.len()
            )));
        }

        let magic = raw.get_u32();
        if magic != MAGIC {
            return Err(invalid(format!("bad magic 0x{:08x}", magic)));
        }

        let version = raw.get_u32();
        if version != FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format version 0x{:08x}",
                version
            )));
        }

        let app_format_version = raw.get_u32();
        let _reserved = raw.get_u32();

        Ok(Self {
            app_format_version,
            version_hash: raw.get_u64(),
            directory_offset: raw.get_u64(),
            deleted_length: raw.get_u64(),
        })
    }

    /// Read and validate the header at offset 0
    pub fn read_from(channel: &mut ByteChannel) -> Result<Self> {
        channel.seek(0)?;
        let mut raw = [0u8; HEADER_SIZE as usize];
        match channel.read_exact(&mut raw) {
            Ok(()) => Self::decode(&raw),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(invalid("file shorter than header".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the header slot at offset 0
    pub fn write_to(&self, channel: &mut ByteChannel) -> Result<()> {
        channel.seek(0)?;
        channel.write_all(&self.encode())?;
        Ok(())
    }

    /// Where the committed directory is expected.
    ///
    /// Offset 0 means nothing was committed through the header; such files may
    /// still carry a Directory chunk right after the header.
    pub fn directory_location(&self) -> u64 {
        if self.directory_offset == 0 {
            HEADER_SIZE
        } else {
            self.directory_offset
        }
    }
}

fn invalid(reason: String) -> KvError {
    KvError::Open(OpenError::InvalidHeader(reason))
}
