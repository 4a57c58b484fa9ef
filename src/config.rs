//! Configuration for ShadowKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Configuration for a single store file
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // File Configuration
    // -------------------------------------------------------------------------
    /// Path of the main store file. The backup lives next to it:
    ///   {path}     (header + data/directory chunks)
    ///   {path}~    (header + last committed directory, only while open for writing)
    pub path: PathBuf,

    /// Open without write access; no backup file is created
    pub readonly: bool,

    /// Opaque application format tag stored in the header of new files
    pub app_format_version: u32,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// When to fsync written files
    pub sync_strategy: SyncStrategy,

    /// What `open` does when neither the directory nor the backup is usable
    pub recovery_policy: RecoveryPolicy,
}

/// Sync strategy: whether durable points fsync the files they wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync main and backup at commit, rollback and compaction
    OnCommit,

    /// Leave flushing to the OS (fast, only safe against process crashes)
    Never,
}

/// Policy when the committed directory is unreadable and the backup cannot repair it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// `open` fails with the recovery error; nothing is modified
    FailClosed,

    /// `open` succeeds with an empty directory and logs an error
    FailOpen,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./shadowkv.store"),
            readonly: false,
            app_format_version: 0,
            sync_strategy: SyncStrategy::OnCommit,
            recovery_policy: RecoveryPolicy::FailClosed,
        }
    }
}

impl Config {
    /// Default config for the given store path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the main store file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Open read-only
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.config.readonly = readonly;
        self
    }

    /// Set the application format tag written into new files
    pub fn app_format_version(mut self, version: u32) -> Self {
        self.config.app_format_version = version;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the recovery policy
    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
