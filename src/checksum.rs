//! Chunk checksum
//!
//! CRC-16 with polynomial 0x1021 (x^16 + x^12 + x^5 + 1), register seeded
//! with 0xFFFF, MSB-first, final complement (CRC-16/GENIBUS). Used
//! identically when a chunk is written and when it is verified.

use crc::{Crc, CRC_16_GENIBUS};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_GENIBUS);

/// Compute the 16-bit checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
