//! On-disk Format Module
//!
//! Fixed file header plus type-tagged, checksummed chunks.
//!
//! ## File Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ FileHeader (40 bytes)                                       │
//! │   Magic (4) | FormatVer (4) | AppFormat (4) | Reserved (4)  │
//! │   VersionHash (8) | DirectoryOffset (8) | DeletedLength (8) │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunk                                                       │
//! │ ┌──────────┬──────────┬────────────┬──────────────────────┐ │
//! │ │ Type (2) │ CRC (2)  │ Length (4) │ Payload (Length)     │ │
//! │ └──────────┴──────────┴────────────┴──────────────────────┘ │
//! │ ... Data and Directory chunks, append-only ...              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The header's directory offset names the most recently committed
//! Directory chunk. Everything not reachable from it is garbage.

mod chunk;
mod header;

pub use chunk::{
    append_chunk, peek_chunk_type, read_chunk, read_chunk_header, write_chunk, ChunkHeader,
    ChunkType, CHUNK_HEADER_SIZE,
};
pub use header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC};
