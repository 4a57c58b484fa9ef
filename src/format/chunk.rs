//! Chunk framing
//!
//! A chunk is an 8-byte header (type, CRC-16 of the payload, payload length)
//! followed by exactly `length` payload bytes.

use std::io;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::channel::ByteChannel;
use crate::checksum::crc16;
use crate::error::{IntegrityError, KvError, Result};

/// Chunk header size: Type (2) + CRC (2) + Length (4) = 8 bytes
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Kinds of chunk stored in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChunkType {
    /// One value payload
    Data = 0x1111,

    /// An encoded key → offset directory
    Directory = 0x2222,
}

impl ChunkType {
    pub fn from_u16(tag: u16) -> Option<Self> {
        match tag {
            0x1111 => Some(ChunkType::Data),
            0x2222 => Some(ChunkType::Directory),
            _ => None,
        }
    }
}

/// Header of a chunk as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Raw type tag (may be unknown on a corrupt file)
    pub chunk_type: u16,
    pub checksum: u16,
    pub length: u32,
}

impl ChunkHeader {
    /// Bytes occupied on disk by this chunk including its header
    pub fn total_size(&self) -> u64 {
        CHUNK_HEADER_SIZE + self.length as u64
    }
}

/// Write a chunk at `offset`; returns the offset just past it
pub fn write_chunk(
    channel: &mut ByteChannel,
    offset: u64,
    chunk_type: ChunkType,
    payload: &[u8],
) -> Result<u64> {
    let length =
        u32::try_from(payload.len()).map_err(|_| KvError::ValueTooLarge(payload.len()))?;

    let mut frame = BytesMut::with_capacity(CHUNK_HEADER_SIZE as usize + payload.len());
    frame.put_u16(chunk_type as u16);
    frame.put_u16(crc16(payload));
    frame.put_u32(length);
    frame.put_slice(payload);

    channel.seek(offset)?;
    channel.write_all(&frame)?;

    debug!(offset, ?chunk_type, length, "wrote chunk");
    Ok(offset + frame.len() as u64)
}

/// Write a chunk at end of file; returns the offset it starts at
pub fn append_chunk(
    channel: &mut ByteChannel,
    chunk_type: ChunkType,
    payload: &[u8],
) -> Result<u64> {
    let offset = channel.seek_to_end()?;
    write_chunk(channel, offset, chunk_type, payload)?;
    Ok(offset)
}

/// Read only the chunk header at `offset`
///
/// A header that would extend past end of file is a `TruncatedRead`.
pub fn read_chunk_header(channel: &mut ByteChannel, offset: u64) -> Result<ChunkHeader> {
    if !fits(channel, offset, CHUNK_HEADER_SIZE)? {
        return Err(IntegrityError::TruncatedRead {
            offset,
            expected: CHUNK_HEADER_SIZE,
        }
        .into());
    }
    channel.seek(offset)?;

    let read = |channel: &mut ByteChannel| -> io::Result<ChunkHeader> {
        Ok(ChunkHeader {
            chunk_type: channel.read_u16()?,
            checksum: channel.read_u16()?,
            length: channel.read_u32()?,
        })
    };

    read(channel).map_err(|e| short_read(e, offset, CHUNK_HEADER_SIZE))
}

/// Type of the chunk at `offset`, or `None` when no full header fits there
pub fn peek_chunk_type(channel: &mut ByteChannel, offset: u64) -> Result<Option<ChunkType>> {
    if !fits(channel, offset, CHUNK_HEADER_SIZE)? {
        return Ok(None);
    }
    let header = read_chunk_header(channel, offset)?;
    Ok(ChunkType::from_u16(header.chunk_type))
}

/// Read and verify the payload of a chunk of type `expected` at `offset`
pub fn read_chunk(
    channel: &mut ByteChannel,
    offset: u64,
    expected: ChunkType,
) -> Result<Vec<u8>> {
    let header = read_chunk_header(channel, offset)?;

    if header.chunk_type != expected as u16 {
        return Err(IntegrityError::InvalidChunkType {
            offset,
            expected: expected as u16,
            found: header.chunk_type,
        }
        .into());
    }

    // A corrupt length must not drive a huge allocation
    let payload_start = offset + CHUNK_HEADER_SIZE;
    if !fits(channel, payload_start, header.length as u64)? {
        return Err(IntegrityError::TruncatedRead {
            offset,
            expected: header.length as u64,
        }
        .into());
    }

    let mut payload = vec![0u8; header.length as usize];
    channel
        .read_exact(&mut payload)
        .map_err(|e| short_read(e, offset, header.length as u64))?;

    let computed = crc16(&payload);
    if computed != header.checksum {
        return Err(IntegrityError::ChecksumMismatch {
            offset,
            stored: header.checksum,
            computed,
        }
        .into());
    }

    Ok(payload)
}

/// True when `length` bytes starting at `offset` lie inside the file
fn fits(channel: &ByteChannel, offset: u64, length: u64) -> Result<bool> {
    Ok(match offset.checked_add(length) {
        Some(end) => end <= channel.len()?,
        None => false,
    })
}

fn short_read(err: io::Error, offset: u64, expected: u64) -> KvError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        IntegrityError::TruncatedRead { offset, expected }.into()
    } else {
        err.into()
    }
}
