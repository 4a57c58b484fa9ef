//! # ShadowKV
//!
//! An embedded, single-process key-value store backed by one append-only file:
//! - Type-tagged, CRC-16 checksummed chunks
//! - In-memory directory (key → chunk offset) committed as its own chunk
//! - Shadow backup file with a generation counter for torn-commit repair
//! - Rollback to the last commit and compaction into a fresh file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │        (one Mutex: get/set/commit/rollback/compact)         │
//! └───────┬──────────────────────┬──────────────────────┬───────┘
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!  ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//!  │  Directory  │        │   Format    │        │   Shadow    │
//!  │   (codec)   │        │ (hdr/chunk) │        │ ({path}~)   │
//!  └─────────────┘        └──────┬──────┘        └──────┬──────┘
//!                                │                      │
//!                                ▼                      ▼
//!                         ┌─────────────┐        ┌─────────────┐
//!                         │ ByteChannel │        │ ByteChannel │
//!                         │   (main)    │        │  (backup)   │
//!                         └─────────────┘        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod checksum;
pub mod channel;
pub mod format;
pub mod directory;
pub mod shadow;
pub mod recovery;
pub mod compaction;
pub mod integrity;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, RecoveryPolicy, SyncStrategy};
pub use directory::{BincodeCodec, Directory, DirectoryCodec};
pub use compaction::CompactionStats;
pub use integrity::IntegrityReport;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ShadowKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
