//! Directory and its codec
//!
//! The directory maps each live key to the offset of its latest Data chunk.
//! It is persisted as the payload of a Directory chunk through a pluggable
//! `DirectoryCodec`.

use std::collections::BTreeMap;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, KvError, Result};

/// Key → Data chunk offset, ordered by key
pub type Directory = BTreeMap<String, u64>;

/// Converts a directory to and from a chunk payload
pub trait DirectoryCodec: Send + Sync {
    fn encode(&self, directory: &Directory) -> Result<Vec<u8>>;

    /// Malformed input is an `IntegrityError::CorruptDirectory`
    fn decode(&self, payload: &[u8]) -> Result<Directory>;
}

/// One serialized directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub key: String,
    pub offset: u64,
}

/// Default codec: a bincode sequence of `DirectoryEntry` sorted by key
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options(limit: u64) -> impl Options {
        bincode::DefaultOptions::new()
            .with_big_endian()
            .with_fixint_encoding()
            .with_limit(limit)
            .reject_trailing_bytes()
    }
}

impl DirectoryCodec for BincodeCodec {
    fn encode(&self, directory: &Directory) -> Result<Vec<u8>> {
        let entries: Vec<DirectoryEntry> = directory
            .iter()
            .map(|(key, &offset)| DirectoryEntry {
                key: key.clone(),
                offset,
            })
            .collect();

        bincode::DefaultOptions::new()
            .with_big_endian()
            .with_fixint_encoding()
            .serialize(&entries)
            .map_err(|e| KvError::Serialization(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Directory> {
        let entries: Vec<DirectoryEntry> = Self::options(payload.len() as u64)
            .deserialize(payload)
            .map_err(|e| IntegrityError::CorruptDirectory(e.to_string()))?;

        let mut directory = Directory::new();
        for entry in entries {
            if directory.insert(entry.key.clone(), entry.offset).is_some() {
                return Err(IntegrityError::CorruptDirectory(format!(
                    "duplicate key {:?}",
                    entry.key
                ))
                .into());
            }
        }
        Ok(directory)
    }
}
