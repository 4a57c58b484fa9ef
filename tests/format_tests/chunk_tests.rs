use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use shadowkv::channel::ByteChannel;
use shadowkv::checksum::crc16;
use shadowkv::error::{IntegrityError, KvError};
use shadowkv::format::{
    append_chunk, peek_chunk_type, read_chunk, read_chunk_header, write_chunk, ChunkType,
    CHUNK_HEADER_SIZE, HEADER_SIZE,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_channel() -> (TempDir, PathBuf, ByteChannel) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("chunks.store");
    let channel = ByteChannel::open_or_create(&path).unwrap();
    (temp, path, channel)
}

fn overwrite_byte(path: &Path, offset: u64, byte: u8) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte]).unwrap();
}

fn integrity_error(err: KvError) -> IntegrityError {
    match err {
        KvError::Integrity(e) => e,
        other => panic!("expected integrity error, got {:?}", other),
    }
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_write_chunk_layout() {
    let (_temp, _path, mut channel) = setup_channel();

    let end = write_chunk(&mut channel, 0, ChunkType::Data, b"Tokyo").unwrap();

    assert_eq!(end, CHUNK_HEADER_SIZE + 5);
    let header = read_chunk_header(&mut channel, 0).unwrap();
    assert_eq!(header.chunk_type, 0x1111);
    assert_eq!(header.checksum, crc16(b"Tokyo"));
    assert_eq!(header.length, 5);
    assert_eq!(header.total_size(), 13);
}

#[test]
fn test_read_chunk_returns_payload() {
    let (_temp, _path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"Japan").unwrap();

    assert_eq!(read_chunk(&mut channel, 0, ChunkType::Data).unwrap(), b"Japan");
}

#[test]
fn test_empty_payload_chunk() {
    let (_temp, _path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"").unwrap();

    assert_eq!(read_chunk(&mut channel, 0, ChunkType::Data).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_append_chunk_returns_start_offset() {
    let (_temp, _path, mut channel) = setup_channel();
    channel.write_all(&[0u8; HEADER_SIZE as usize]).unwrap();

    let first = append_chunk(&mut channel, ChunkType::Data, b"one").unwrap();
    let second = append_chunk(&mut channel, ChunkType::Data, b"two").unwrap();

    assert_eq!(first, HEADER_SIZE);
    assert_eq!(second, HEADER_SIZE + CHUNK_HEADER_SIZE + 3);
    assert_eq!(read_chunk(&mut channel, second, ChunkType::Data).unwrap(), b"two");
}

#[test]
fn test_peek_chunk_type() {
    let (_temp, _path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Directory, b"dir").unwrap();

    assert_eq!(
        peek_chunk_type(&mut channel, 0).unwrap(),
        Some(ChunkType::Directory)
    );
    // Past end of file
    assert_eq!(peek_chunk_type(&mut channel, 100).unwrap(), None);
}

// =============================================================================
// Integrity Failure Tests
// =============================================================================

#[test]
fn test_read_chunk_wrong_type() {
    let (_temp, _path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"value").unwrap();

    let err = integrity_error(read_chunk(&mut channel, 0, ChunkType::Directory).unwrap_err());
    assert_eq!(
        err,
        IntegrityError::InvalidChunkType {
            offset: 0,
            expected: 0x2222,
            found: 0x1111,
        }
    );
}

#[test]
fn test_read_chunk_checksum_mismatch() {
    let (_temp, path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"value").unwrap();

    // Flip the first payload byte ('v' -> 'w')
    overwrite_byte(&path, CHUNK_HEADER_SIZE, b'w');

    let err = integrity_error(read_chunk(&mut channel, 0, ChunkType::Data).unwrap_err());
    assert!(matches!(err, IntegrityError::ChecksumMismatch { offset: 0, .. }));
}

#[test]
fn test_read_chunk_truncated_payload() {
    let (_temp, path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"a longer value").unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(CHUNK_HEADER_SIZE + 3)
        .unwrap();

    let err = integrity_error(read_chunk(&mut channel, 0, ChunkType::Data).unwrap_err());
    assert_eq!(
        err,
        IntegrityError::TruncatedRead {
            offset: 0,
            expected: 14,
        }
    );
}

#[test]
fn test_read_chunk_header_past_end() {
    let (_temp, _path, mut channel) = setup_channel();
    channel.write_all(&[0x11, 0x11, 0x00]).unwrap();

    let err = integrity_error(read_chunk_header(&mut channel, 0).unwrap_err());
    assert!(matches!(err, IntegrityError::TruncatedRead { offset: 0, .. }));
}

#[test]
fn test_read_chunk_header_at_absurd_offset() {
    let (_temp, _path, mut channel) = setup_channel();
    write_chunk(&mut channel, 0, ChunkType::Data, b"payload").unwrap();

    for offset in [u64::MAX - 3, 0x0100_0000_0000_0028, 0x8000_0000_0000_0028] {
        let err = integrity_error(read_chunk_header(&mut channel, offset).unwrap_err());
        assert_eq!(
            err,
            IntegrityError::TruncatedRead {
                offset,
                expected: CHUNK_HEADER_SIZE,
            }
        );

        let err = integrity_error(read_chunk(&mut channel, offset, ChunkType::Data).unwrap_err());
        assert!(matches!(err, IntegrityError::TruncatedRead { .. }));
        assert_eq!(peek_chunk_type(&mut channel, offset).unwrap(), None);
    }
}
