//! Error types for ShadowKV
//!
//! A unified `KvError` plus the four failure families of the engine:
//! - `OpenError`: fatal to `Engine::open`
//! - `IntegrityError`: a single chunk failed verification (recovered locally)
//! - `RecoveryError`: the backup could not repair the main file
//! - `CompactionError`: fatal to `Engine::compact_to` only

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for ShadowKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Compaction(#[from] CompactionError),

    #[error("Store is opened read-only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    #[error("Value too large: {0} bytes (max {max})", max = u32::MAX)]
    ValueTooLarge(usize),

    #[error("Value for key {key:?} is not valid UTF-8")]
    InvalidUtf8 { key: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures that make a store unusable
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    #[error("Cannot create directory {path:?}: {source}")]
    CannotCreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open file {path:?}: {source}")]
    CannotOpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Chunk-level verification failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Invalid chunk type at offset {offset}: expected 0x{expected:04x}, found 0x{found:04x}")]
    InvalidChunkType { offset: u64, expected: u16, found: u16 },

    #[error("Checksum mismatch at offset {offset}: stored 0x{stored:04x}, computed 0x{computed:04x}")]
    ChecksumMismatch { offset: u64, stored: u16, computed: u16 },

    #[error("Truncated read at offset {offset}: expected {expected} bytes")]
    TruncatedRead { offset: u64, expected: u64 },

    #[error("Corrupt directory: {0}")]
    CorruptDirectory(String),
}

/// Failures of the backup-driven repair path
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("No backup file available")]
    BackupMissing,

    #[error("Backup header is invalid: {0}")]
    BackupHeaderInvalid(String),

    #[error("Backup generation {backup} does not match main generation {main}")]
    VersionMismatch { main: u64, backup: u64 },

    #[error("Backup directory is corrupt: {0}")]
    BackupDirectoryCorrupt(String),
}

/// Failures creating a compacted copy
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("Cannot create compaction destination {path:?}: {source}")]
    CannotCreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compaction destination is the source file")]
    SameAsSource,
}
