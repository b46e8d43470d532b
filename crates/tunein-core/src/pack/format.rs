//! On-disk layout of the archive index (`.fat`).
//!
//! ```text
//! header   magic u32 | version u32 | platform u8 + 3 zero bytes | reserved u32 | count u32
//! entry    name hash u64 | author u32 | (size << 2 | scheme) u32 | offset >> 4 u32 | packed size u32
//! trailer  0 u32 | 0 u32
//! ```
//!
//! All integers are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tunein_schema::NameHash;

use super::PackError;

/// `"FAT2"` read as a little-endian word.
pub const MAGIC: u32 = 0x4641_5432;

/// Index format version understood by the runtime.
pub const VERSION: u32 = 5;

/// Platform byte for PC builds.
pub const PLATFORM_PC: u8 = 1;

/// Every payload starts on a multiple of this.
pub const ALIGNMENT: u64 = 16;

/// Serialized size of one entry.
pub const ENTRY_SIZE: usize = 24;

const HEADER_SIZE: usize = 20;
const TRAILER_SIZE: usize = 8;
const MAX_UNCOMPRESSED: u32 = u32::MAX >> 2;

/// How a payload is stored in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Raw bytes.
    Stored,
    /// zlib-wrapped deflate.
    Deflate,
}

impl Scheme {
    fn bits(self) -> u32 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 1,
        }
    }

    fn from_bits(bits: u32) -> Result<Self, PackError> {
        match bits {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Deflate),
            other => Err(PackError::Format(format!(
                "unknown compression scheme {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "stored"),
            Self::Deflate => write!(f, "deflate"),
        }
    }
}

/// One file inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatEntry {
    /// Key the runtime looks the file up by.
    pub name_hash: NameHash,
    /// Watermark word.
    pub author: u32,
    /// Payload offset in the data file (multiple of [`ALIGNMENT`]).
    pub offset: u64,
    /// Uncompressed file size.
    pub uncompressed_size: u32,
    /// Bytes occupied in the data file.
    pub compressed_size: u32,
    /// Storage scheme.
    pub scheme: Scheme,
}

impl FatEntry {
    fn write<W: Write>(&self, writer: &mut W) -> Result<(), PackError> {
        if self.uncompressed_size > MAX_UNCOMPRESSED {
            return Err(PackError::Overflow {
                field: "uncompressed size",
                value: u64::from(self.uncompressed_size),
            });
        }
        if self.offset % ALIGNMENT != 0 {
            return Err(PackError::Format(format!(
                "unaligned offset {:#x} for {}",
                self.offset, self.name_hash
            )));
        }
        let offset = u32::try_from(self.offset >> 4).map_err(|_| PackError::Overflow {
            field: "offset",
            value: self.offset,
        })?;

        writer.write_u64::<LittleEndian>(self.name_hash.value())?;
        writer.write_u32::<LittleEndian>(self.author)?;
        writer.write_u32::<LittleEndian>((self.uncompressed_size << 2) | self.scheme.bits())?;
        writer.write_u32::<LittleEndian>(offset)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self, PackError> {
        let name_hash = NameHash::new(reader.read_u64::<LittleEndian>()?);
        let author = reader.read_u32::<LittleEndian>()?;
        let packed = reader.read_u32::<LittleEndian>()?;
        let offset = u64::from(reader.read_u32::<LittleEndian>()?) << 4;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            name_hash,
            author,
            offset,
            uncompressed_size: packed >> 2,
            compressed_size,
            scheme: Scheme::from_bits(packed & 0b11)?,
        })
    }
}

/// Parsed or to-be-written index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatIndex {
    /// Platform byte.
    pub platform: u8,
    /// Entries in ascending key order.
    pub entries: Vec<FatEntry>,
}

impl Default for FatIndex {
    fn default() -> Self {
        Self {
            platform: PLATFORM_PC,
            entries: Vec::new(),
        }
    }
}

impl FatIndex {
    /// Serialize the index.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Overflow`] when a value does not fit its field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackError> {
        let count = u32::try_from(self.entries.len()).map_err(|_| PackError::Overflow {
            field: "entry count",
            value: self.entries.len() as u64,
        })?;

        let mut out = Vec::with_capacity(HEADER_SIZE + self.entries.len() * ENTRY_SIZE + TRAILER_SIZE);
        out.write_u32::<LittleEndian>(MAGIC)?;
        out.write_u32::<LittleEndian>(VERSION)?;
        out.write_u32::<LittleEndian>(u32::from(self.platform))?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(count)?;
        for entry in &self.entries {
            entry.write(&mut out)?;
        }
        // Localization and sub-index tables, both empty.
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(0)?;
        Ok(out)
    }

    /// Parse an index.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Format`] for a foreign or truncated file.
    pub fn parse(bytes: &[u8]) -> Result<Self, PackError> {
        let mut cursor = Cursor::new(bytes);
        let truncated = |_| PackError::Format("truncated index".to_string());

        let magic = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if magic != MAGIC {
            return Err(PackError::Format(format!("bad magic {magic:#010x}")));
        }
        let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != VERSION {
            return Err(PackError::Format(format!("unsupported version {version}")));
        }
        let flags = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let _reserved = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;

        let needed = count
            .checked_mul(ENTRY_SIZE)
            .and_then(|n| n.checked_add(HEADER_SIZE));
        if needed.is_none_or(|n| bytes.len() < n) {
            return Err(PackError::Format("truncated index".to_string()));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(FatEntry::read(&mut cursor)?);
        }

        Ok(Self {
            platform: (flags & 0xFF) as u8,
            entries,
        })
    }

    /// Read an index file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PackError> {
        let bytes = std::fs::read(path).map_err(|source| PackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes)
    }

    /// Write the index file to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), PackError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| PackError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(hash: u64, offset: u64) -> FatEntry {
        FatEntry {
            name_hash: NameHash::new(hash),
            author: 0x5475_6E65,
            offset,
            uncompressed_size: 100,
            compressed_size: 60,
            scheme: Scheme::Deflate,
        }
    }

    #[test]
    fn empty_index_layout() {
        let bytes = FatIndex::default().to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x32, 0x54, 0x41, 0x46, // magic
                5, 0, 0, 0, // version
                1, 0, 0, 0, // platform
                0, 0, 0, 0, // reserved
                0, 0, 0, 0, // count
                0, 0, 0, 0, 0, 0, 0, 0, // trailer
            ]
        );
    }

    #[test]
    fn entry_layout() {
        let index = FatIndex {
            platform: PLATFORM_PC,
            entries: vec![entry(0x0102_0304_0506_0708, 0x20)],
        };
        let bytes = index.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + ENTRY_SIZE + TRAILER_SIZE);
        let raw = &bytes[HEADER_SIZE..HEADER_SIZE + ENTRY_SIZE];
        assert_eq!(&raw[0..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&raw[8..12], &0x5475_6E65u32.to_le_bytes());
        assert_eq!(&raw[12..16], &((100u32 << 2) | 1).to_le_bytes());
        assert_eq!(&raw[16..20], &2u32.to_le_bytes());
        assert_eq!(&raw[20..24], &60u32.to_le_bytes());

        assert_eq!(FatIndex::parse(&bytes).unwrap(), index);
    }

    #[test]
    fn rejects_unaligned_offsets() {
        let index = FatIndex {
            platform: PLATFORM_PC,
            entries: vec![entry(1, 0x21)],
        };
        assert!(matches!(index.to_bytes(), Err(PackError::Format(_))));
    }

    #[test]
    fn rejects_oversized_entries() {
        let mut big = entry(1, 0);
        big.uncompressed_size = 1 << 30;
        let index = FatIndex {
            platform: PLATFORM_PC,
            entries: vec![big],
        };
        assert!(matches!(
            index.to_bytes(),
            Err(PackError::Overflow {
                field: "uncompressed size",
                ..
            })
        ));
    }

    #[test]
    fn rejects_foreign_files() {
        assert!(matches!(
            FatIndex::parse(b"PK\x03\x04 not an index"),
            Err(PackError::Format(_))
        ));
        assert!(matches!(FatIndex::parse(&[0x32, 0x54]), Err(PackError::Format(_))));

        let mut bytes = FatIndex::default().to_bytes().unwrap();
        bytes[16] = 3;
        assert!(matches!(FatIndex::parse(&bytes), Err(PackError::Format(_))));
    }
}
