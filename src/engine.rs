//! Engine Module
//!
//! The storage engine that owns the main file, its shadow backup and the
//! in-memory directory.
//!
//! ## Responsibilities
//! - Create or load the file header and directory at open
//! - Repair a torn commit from the backup when generations agree
//! - Append values and track superseded bytes
//! - Commit, roll back, compact and verify
//! - Auto-commit and remove the backup on clean shutdown

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::channel::ByteChannel;
use crate::compaction::{self, CompactionStats};
use crate::config::{Config, RecoveryPolicy, SyncStrategy};
use crate::directory::{BincodeCodec, Directory, DirectoryCodec};
use crate::error::{CompactionError, KvError, OpenError, RecoveryError, Result};
use crate::format::{append_chunk, read_chunk, read_chunk_header, ChunkType, FileHeader};
use crate::integrity::{self, IntegrityReport};
use crate::recovery;
use crate::shadow::{self, ShadowFile};

/// The main storage engine
///
/// ## Concurrency Model
///
/// One `parking_lot::Mutex` guards all mutable state and is held for the full
/// duration of every operation, reads included. Chunk reads are cheap and
/// seeking the shared file handle needs exclusive access anyway.
///
/// Only one writable engine may have a given path open at a time; this is
/// not detected.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// `{path}~`
    backup_path: PathBuf,

    /// Directory payload encoding
    codec: Box<dyn DirectoryCodec>,

    state: Mutex<StoreState>,
}

/// Everything the lock protects
struct StoreState {
    main: ByteChannel,

    /// Present exactly when opened for writing
    backup: Option<ShadowFile>,

    header: FileHeader,
    directory: Directory,

    /// Uncommitted sets since the last commit/rollback
    dirty: bool,

    closed: bool,
}

impl Engine {
    /// Open or create a store with the default directory codec
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_codec(config, Box::new(BincodeCodec))
    }

    /// Open or create a store writable at `path` with default settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::new(path.as_ref()))
    }

    /// Open an existing store read-only
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).readonly(true).build())
    }

    /// Open or create a store with a custom directory codec
    ///
    /// On startup:
    /// 1. Create the parent directory (writable only)
    /// 2. Open or create the main file
    /// 3. Write a fresh header into an empty file, or parse the existing one
    /// 4. Load the committed directory, repairing it from the backup if needed
    /// 5. Anchor the backup to the loaded state (writable only)
    pub fn open_with_codec(config: Config, codec: Box<dyn DirectoryCodec>) -> Result<Self> {
        let path = config.path.clone();
        let backup_path = shadow::backup_path(&path);
        let writable = !config.readonly;
        let sync = config.sync_strategy == SyncStrategy::OnCommit;

        // Step 1: Parent directory
        if writable {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| OpenError::CannotCreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        // Step 2: Main file
        let opened = if writable {
            ByteChannel::open_or_create(&path)
        } else {
            ByteChannel::open_read_only(&path)
        };
        let mut main = opened.map_err(|source| OpenError::CannotOpenFile {
            path: path.clone(),
            source,
        })?;

        // Step 3-4: Header and directory
        let (header, directory) = if main.is_empty()? {
            let header = FileHeader::new(config.app_format_version);
            if writable {
                header.write_to(&mut main)?;
                if sync {
                    main.sync()?;
                }
            }
            debug!(?path, "initialized empty store");
            (header, Directory::new())
        } else {
            let header = FileHeader::read_from(&mut main)?;
            Self::load_directory(&mut main, header, &backup_path, codec.as_ref(), &config)?
        };

        // Step 5: Recovery anchor
        let backup = if writable {
            Some(Self::anchor_backup(
                &backup_path,
                &header,
                &directory,
                codec.as_ref(),
                sync,
            )?)
        } else {
            None
        };

        info!(
            ?path,
            readonly = config.readonly,
            generation = header.version_hash,
            entries = directory.len(),
            "store opened"
        );

        Ok(Self {
            config,
            backup_path,
            codec,
            state: Mutex::new(StoreState {
                main,
                backup,
                header,
                directory,
                dirty: false,
                closed: false,
            }),
        })
    }

    /// Committed header and directory, or the backup's copy when the committed
    /// directory is unreadable
    fn load_directory(
        main: &mut ByteChannel,
        header: FileHeader,
        backup_path: &Path,
        codec: &dyn DirectoryCodec,
        config: &Config,
    ) -> Result<(FileHeader, Directory)> {
        let failure = match recovery::read_committed_directory(main, &header, codec) {
            Ok(directory) => return Ok((header, directory)),
            Err(KvError::Integrity(failure)) => failure,
            Err(e) => return Err(e),
        };

        warn!(
            offset = header.directory_location(),
            %failure,
            "committed directory unreadable, trying backup"
        );

        let recovered = recovery::repair_from_backup(
            main,
            &header,
            backup_path,
            codec,
            !config.readonly,
            config.sync_strategy == SyncStrategy::OnCommit,
        );

        match recovered {
            Ok(state) => Ok(state),
            Err(KvError::Recovery(reason)) => match config.recovery_policy {
                RecoveryPolicy::FailClosed => {
                    error!(%reason, "directory cannot be recovered, refusing to open");
                    Err(reason.into())
                }
                RecoveryPolicy::FailOpen => {
                    error!(
                        %reason,
                        "directory cannot be recovered, continuing with an empty directory; \
                         stored values are unreachable"
                    );
                    Ok((header, Directory::new()))
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Make the backup describe the loaded generation before any mutation
    fn anchor_backup(
        backup_path: &Path,
        header: &FileHeader,
        directory: &Directory,
        codec: &dyn DirectoryCodec,
        sync: bool,
    ) -> Result<ShadowFile> {
        let existed = backup_path.exists();
        let mut backup = ShadowFile::open_or_create(backup_path)?;

        if existed {
            match backup.snapshot(codec) {
                Ok(snapshot) if snapshot.header.version_hash == header.version_hash => {
                    debug!(
                        generation = header.version_hash,
                        "backup from unclean shutdown already matches"
                    );
                    return Ok(backup);
                }
                Ok(snapshot) => warn!(
                    backup = snapshot.header.version_hash,
                    main = header.version_hash,
                    "stale backup, refreshing"
                ),
                Err(reason) => warn!(%reason, "unusable backup, refreshing"),
            }
        }

        let payload = codec.encode(directory)?;
        backup.record(header, &payload, sync)?;
        Ok(backup)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// A value whose chunk fails verification reads as `None`; the rest of
    /// the store is unaffected.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(&offset) = state.directory.get(key) else {
            return Ok(None);
        };

        match read_chunk(&mut state.main, offset, ChunkType::Data) {
            Ok(value) => Ok(Some(value)),
            Err(KvError::Integrity(failure)) => {
                warn!(key, offset, %failure, "value failed integrity check");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Get a value as UTF-8 text
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| KvError::InvalidUtf8 {
                    key: key.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Live keys in ascending order
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().directory.keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().directory.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().directory.is_empty()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set or (with `None`) delete a key
    ///
    /// Steps:
    /// 1. Size the superseded chunk, if any, for garbage accounting
    /// 2. Append a Data chunk at end of file, or drop the key
    /// 3. Mark the store dirty
    pub fn set(&self, key: &str, value: Option<&[u8]>) -> Result<()> {
        self.ensure_writable()?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Step 1: Bookkeeping never blocks the write
        let superseded = match state.directory.get(key) {
            Some(&offset) => match read_chunk_header(&mut state.main, offset) {
                Ok(header) => header.total_size(),
                Err(e) => {
                    warn!(key, offset, error = %e, "cannot size superseded chunk, skipping accounting");
                    0
                }
            },
            None => 0,
        };

        // Step 2: Append or unlink
        match value {
            Some(bytes) => {
                let offset = append_chunk(&mut state.main, ChunkType::Data, bytes)?;
                state.directory.insert(key.to_string(), offset);
            }
            None => {
                state.directory.remove(key);
            }
        }

        // Step 3
        state.header.deleted_length += superseded;
        state.dirty = true;
        Ok(())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set(key, Some(value))
    }

    /// Delete a key (logical; bytes stay until compaction)
    pub fn delete(&self, key: &str) -> Result<()> {
        self.set(key, None)
    }

    /// Set or delete a UTF-8 text value
    pub fn set_string(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.set(key, value.map(str::as_bytes))
    }

    // =========================================================================
    // Commit / Rollback
    // =========================================================================

    /// Make all sets since the last commit durable
    pub fn commit(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut state = self.state.lock();
        self.commit_locked(&mut state)
    }

    /// Internal commit implementation (called with the lock held)
    ///
    /// Steps:
    /// 1. Append the encoded directory as a Directory chunk
    /// 2. Point the header at it and bump the generation
    /// 3. Rewrite the main header
    /// 4. Mirror header and directory into the backup
    fn commit_locked(&self, state: &mut StoreState) -> Result<()> {
        let sync = self.syncs();

        // Step 1
        let payload = self.codec.encode(&state.directory)?;
        let offset = append_chunk(&mut state.main, ChunkType::Directory, &payload)?;
        if sync {
            state.main.sync()?;
        }

        // Step 2-3
        let mut header = state.header;
        header.directory_offset = offset;
        header.version_hash = header.version_hash.wrapping_add(1);
        header.write_to(&mut state.main)?;
        if sync {
            state.main.sync()?;
        }
        state.header = header;

        // Step 4: A crash before this leaves the backup one generation behind
        if let Some(backup) = state.backup.as_mut() {
            backup.record(&header, &payload, sync)?;
        }

        state.dirty = false;

        info!(
            generation = header.version_hash,
            entries = state.directory.len(),
            directory_offset = offset,
            deleted_length = header.deleted_length,
            "committed"
        );
        Ok(())
    }

    /// Discard every set since the last commit
    ///
    /// Restores header and directory from the backup and cuts the main file
    /// right after the restored directory chunk.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_writable()?;
        let sync = self.syncs();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let backup = state.backup.as_mut().ok_or(RecoveryError::BackupMissing)?;
        let snapshot = backup.snapshot(self.codec.as_ref())?;

        // Step 1: Header slot
        snapshot.header.write_to(&mut state.main)?;

        // Step 2: Directory at the restored offset, then truncate
        recovery::restore_directory(
            &mut state.main,
            snapshot.header.directory_location(),
            &snapshot.payload,
            sync,
        )?;

        // Step 3
        let discarded = state.dirty;
        state.header = snapshot.header;
        state.directory = snapshot.directory;
        state.dirty = false;

        info!(
            generation = state.header.version_hash,
            entries = state.directory.len(),
            discarded,
            "rolled back to last commit"
        );
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write a compacted copy of the current state to `dest`
    ///
    /// Uses the in-memory directory, so uncommitted sets are included. The
    /// source file is not modified.
    pub fn compact_to(&self, dest: impl AsRef<Path>) -> Result<CompactionStats> {
        let dest = dest.as_ref();
        if self.is_own_file(dest) {
            return Err(CompactionError::SameAsSource.into());
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        compaction::compact(
            &mut state.main,
            &state.header,
            &state.directory,
            dest,
            self.codec.as_ref(),
            self.syncs(),
        )
    }

    /// Verify the committed on-disk state, entry by entry
    pub fn integrity_report(&self) -> Result<IntegrityReport> {
        let mut state = self.state.lock();
        integrity::verify(&mut state.main, self.codec.as_ref())
    }

    /// True when header, directory and every entry verify
    pub fn check_integrity(&self) -> bool {
        match self.integrity_report() {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        key = %failure.key,
                        offset = failure.offset,
                        error = %failure.error,
                        "entry failed integrity check"
                    );
                }
                report.is_clean()
            }
            Err(e) => {
                warn!(error = %e, "integrity check failed");
                false
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Commits pending sets, then removes the backup file.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    /// Idempotent shutdown shared by `close` and `Drop`
    ///
    /// The backup is only removed after a successful commit, so a failed
    /// shutdown still looks like a crash to the next open.
    fn shutdown(&self) -> Result<()> {
        let mut guard = self.state.lock();
        if guard.closed {
            return Ok(());
        }
        guard.closed = true;

        if self.config.readonly {
            return Ok(());
        }

        if guard.dirty {
            self.commit_locked(&mut guard)?;
        }

        if let Some(backup) = guard.backup.take() {
            backup.remove()?;
        }

        info!(path = ?self.config.path, "store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Main store file path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Backup file path (`{path}~`)
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn is_read_only(&self) -> bool {
        self.config.readonly
    }

    /// True when there are uncommitted sets
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Number of commits recorded in the header
    pub fn generation(&self) -> u64 {
        self.state.lock().header.version_hash
    }

    /// Bytes held by superseded chunks
    pub fn deleted_length(&self) -> u64 {
        self.state.lock().header.deleted_length
    }

    /// Application format tag from the header
    pub fn app_format_version(&self) -> u32 {
        self.state.lock().header.app_format_version
    }

    /// Current size of the main file
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.state.lock().main.len()?)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.config.readonly {
            return Err(KvError::ReadOnly);
        }
        Ok(())
    }

    fn syncs(&self) -> bool {
        self.config.sync_strategy == SyncStrategy::OnCommit
    }

    fn is_own_file(&self, dest: &Path) -> bool {
        if dest == self.config.path || dest == self.backup_path {
            return true;
        }
        match (fs::canonicalize(dest), fs::canonicalize(&self.config.path)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(path = ?self.config.path, error = %e, "shutdown failed, backup kept for recovery");
        }
    }
}
