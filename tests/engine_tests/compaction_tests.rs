//! Tests for compaction
//!
//! These tests verify:
//! - The destination holds exactly the live key/value pairs
//! - Superseded bytes are dropped and the source is left untouched
//! - Destination handling (parent creation, truncation, refusal of own files)
//! - Unreadable entries are skipped rather than aborting

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use shadowkv::config::Config;
use shadowkv::engine::Engine;
use shadowkv::error::{CompactionError, KvError};
use shadowkv::format::{CHUNK_HEADER_SIZE, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, PathBuf, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("source.store");
    let engine = Engine::open_path(&path).unwrap();
    (temp_dir, path, engine)
}

fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
}

// =============================================================================
// Content Tests
// =============================================================================

#[test]
fn test_compaction_keeps_only_live_pairs() {
    let (temp, path, engine) = setup_temp_engine();

    engine.put("a", b"1").unwrap();
    engine.put("b", b"22").unwrap();
    engine.put("a", b"333").unwrap();
    engine.delete("b").unwrap();
    engine.put("c", b"4").unwrap();
    engine.commit().unwrap();

    let dest = temp.path().join("compacted.store");
    let stats = engine.compact_to(&dest).unwrap();

    // header + a(8+3) + c(8+1) + directory(8 + 2 * (8 + 1 + 8))
    assert_eq!(stats.entries_copied, 2);
    assert_eq!(stats.entries_skipped, 0);
    assert_eq!(stats.file_size, 110);
    assert_eq!(fs::metadata(&dest).unwrap().len(), 110);
    assert_eq!(stats.bytes_reclaimed, fs::metadata(&path).unwrap().len() - 110);
    assert_eq!(stats.path, dest);

    let compacted = Engine::open_read_only(&dest).unwrap();
    assert_eq!(compacted.keys(), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(compacted.get("a").unwrap(), Some(b"333".to_vec()));
    assert_eq!(compacted.get("c").unwrap(), Some(b"4".to_vec()));
    assert_eq!(compacted.get("b").unwrap(), None);
    assert_eq!(compacted.deleted_length(), 0);
    assert!(compacted.check_integrity());
}

#[test]
fn test_compaction_values_packed_after_header() {
    let (temp, _path, engine) = setup_temp_engine();

    engine.put("first", b"xyz").unwrap();
    engine.put("first", b"xy").unwrap();
    engine.put("second", b"q").unwrap();

    let dest = temp.path().join("packed.store");
    engine.compact_to(&dest).unwrap();

    let bytes = fs::read(&dest).unwrap();
    let first = HEADER_SIZE as usize;
    let second = first + CHUNK_HEADER_SIZE as usize + 2;
    assert_eq!(&bytes[first + 8..first + 10], b"xy");
    assert_eq!(&bytes[second + 8..second + 9], b"q");
}

#[test]
fn test_compaction_includes_uncommitted_sets() {
    let (temp, _path, engine) = setup_temp_engine();

    engine.put("committed", b"yes").unwrap();
    engine.commit().unwrap();
    engine.put("pending", b"also").unwrap();

    let dest = temp.path().join("compacted.store");
    engine.compact_to(&dest).unwrap();

    assert!(engine.is_dirty());

    let compacted = Engine::open_read_only(&dest).unwrap();
    assert_eq!(compacted.get("committed").unwrap(), Some(b"yes".to_vec()));
    assert_eq!(compacted.get("pending").unwrap(), Some(b"also".to_vec()));
}

#[test]
fn test_compaction_leaves_source_untouched() {
    let (temp, path, engine) = setup_temp_engine();

    engine.put("a", b"1").unwrap();
    engine.put("a", b"2").unwrap();
    engine.commit().unwrap();
    let before = fs::read(&path).unwrap();
    let deleted = engine.deleted_length();

    engine.compact_to(temp.path().join("out.store")).unwrap();

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(engine.deleted_length(), deleted);
    assert_eq!(engine.get("a").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_compaction_carries_generation_and_app_format() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tagged.store");
    let engine = Engine::open(Config::builder().path(&path).app_format_version(7).build()).unwrap();

    engine.put("k", b"v").unwrap();
    engine.commit().unwrap();
    engine.put("k", b"w").unwrap();
    engine.commit().unwrap();

    let dest = temp.path().join("out.store");
    engine.compact_to(&dest).unwrap();

    let compacted = Engine::open_read_only(&dest).unwrap();
    assert_eq!(compacted.generation(), 2);
    assert_eq!(compacted.app_format_version(), 7);
}

#[test]
fn test_compacted_store_is_writable() {
    let (temp, _path, engine) = setup_temp_engine();

    engine.put("old", b"value").unwrap();
    let dest = temp.path().join("out.store");
    engine.compact_to(&dest).unwrap();
    drop(engine);

    let compacted = Engine::open_path(&dest).unwrap();
    compacted.put("new", b"entry").unwrap();
    compacted.close().unwrap();

    let reopened = Engine::open_read_only(&dest).unwrap();
    assert_eq!(reopened.keys(), vec!["new".to_string(), "old".to_string()]);
}

#[test]
fn test_compaction_from_read_only_engine() {
    let (temp, path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();
    engine.close().unwrap();

    let reader = Engine::open_read_only(&path).unwrap();
    let dest = temp.path().join("out.store");
    let stats = reader.compact_to(&dest).unwrap();

    assert_eq!(stats.entries_copied, 1);
    assert_eq!(
        Engine::open_read_only(&dest).unwrap().get("k").unwrap(),
        Some(b"v".to_vec())
    );
}

// =============================================================================
// Destination Tests
// =============================================================================

#[test]
fn test_compaction_refuses_own_files() {
    let (_temp, path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();

    let err = engine.compact_to(&path).unwrap_err();
    assert!(matches!(
        err,
        KvError::Compaction(CompactionError::SameAsSource)
    ));

    let backup = engine.backup_path().to_path_buf();
    let err = engine.compact_to(&backup).unwrap_err();
    assert!(matches!(
        err,
        KvError::Compaction(CompactionError::SameAsSource)
    ));

    assert_eq!(engine.get("k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_compaction_creates_parent_directories() {
    let (temp, _path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();

    let dest = temp.path().join("nested").join("deeper").join("out.store");
    engine.compact_to(&dest).unwrap();

    assert!(dest.exists());
}

#[test]
fn test_compaction_truncates_existing_destination() {
    let (temp, _path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();

    let dest = temp.path().join("junk.store");
    fs::write(&dest, vec![0xAB; 10_000]).unwrap();

    let stats = engine.compact_to(&dest).unwrap();

    assert!(stats.file_size < 10_000);
    assert_eq!(fs::metadata(&dest).unwrap().len(), stats.file_size);
    assert!(Engine::open_read_only(&dest).unwrap().check_integrity());
}

#[test]
fn test_compaction_destination_under_a_file() {
    let (temp, _path, engine) = setup_temp_engine();
    engine.put("k", b"v").unwrap();

    let blocker = temp.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();

    let err = engine.compact_to(blocker.join("out.store")).unwrap_err();
    assert!(matches!(
        err,
        KvError::Compaction(CompactionError::CannotCreateDestination { .. })
    ));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_compaction_skips_corrupt_entries() {
    let (temp, path, engine) = setup_temp_engine();

    engine.put("a", b"broken").unwrap();
    engine.put("b", b"fine").unwrap();
    engine.close().unwrap();

    // "a" is the first chunk after the header
    flip_byte(&path, HEADER_SIZE + CHUNK_HEADER_SIZE);

    let engine = Engine::open_path(&path).unwrap();
    let dest = temp.path().join("salvaged.store");
    let stats = engine.compact_to(&dest).unwrap();

    assert_eq!(stats.entries_copied, 1);
    assert_eq!(stats.entries_skipped, 1);

    let compacted = Engine::open_read_only(&dest).unwrap();
    assert_eq!(compacted.keys(), vec!["b".to_string()]);
    assert!(compacted.check_integrity());
}
