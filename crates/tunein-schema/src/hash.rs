//! 64-bit name checksum shared by archive keys and path references.
//!
//! The runtime hashes the same path strings independently in several places
//! (archive index, entity records), so every caller must go through
//! [`checksum`] to agree on the result.

use serde::{Deserialize, Serialize};

/// Reflected CRC-64/ISO polynomial (ISO 3309, `x^64 + x^4 + x^3 + x + 1`).
const POLY: u64 = 0xD800_0000_0000_0000;

const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Raw CRC-64 over bytes (initial value 0, no final xor).
pub fn crc64(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |hash, &byte| {
        TABLE[((hash ^ u64::from(byte)) & 0xFF) as usize] ^ (hash >> 8)
    })
}

/// Case-insensitive checksum of a name or path.
///
/// The input is lowercased before hashing, so `Foo/Bar` and `foo/bar`
/// produce the same key.
pub fn checksum(text: &str) -> u64 {
    crc64(text.to_lowercase().as_bytes())
}

/// [`checksum`] rendered as 8 little-endian bytes in uppercase hex.
pub fn checksum_hex(text: &str) -> String {
    hex::encode_upper(checksum(text).to_le_bytes())
}

/// Newtype for an archive name hash.
///
/// Ordering follows the numeric value, which is the order entries are laid
/// out in the archive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NameHash(u64);

impl NameHash {
    /// Wrap a raw 64-bit key.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Hash a relative path the way the runtime does.
    pub fn of_path(path: &str) -> Self {
        Self(checksum(path))
    }

    /// Parse a literal key from up to 16 hex digits.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is empty, longer than 16 characters, or
    /// contains non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.is_empty() || s.len() > 16 {
            return Err(format!("Invalid name hash: expected 1-16 hex chars, got '{s}'"));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| format!("Invalid name hash '{s}': {e}"))
    }

    /// Return the raw key.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NameHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl From<u64> for NameHash {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
