//! Shared types and byte-level primitives for tunein content bundles.
//!
//! Everything in here must produce byte-identical output across runs and
//! across callers: the archive packer and the record synthesizer hash the
//! same path strings independently and the runtime only resolves references
//! when both sides agree.

pub mod codec;
pub mod hash;
pub mod types;

// Re-exports
pub use codec::{Encoding, Width, encode_bytes, encode_hex, encode_wide_hex};
pub use hash::{NameHash, checksum, checksum_hex, crc64};
pub use types::*;

/// Fixed 40-byte header prepended to a DDS image to make an XBT texture.
pub const XBT_HEADER: [u8; 40] = [
    0x54, 0x42, 0x58, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x28, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    0x91, 0x54, 0x5C, 0x05, 0xB1, 0x21, 0x12, 0x88, 0x35, 0xD7, 0x87, 0x29, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
];
