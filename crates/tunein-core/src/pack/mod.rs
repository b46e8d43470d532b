//! Content-addressed archive packer.
//!
//! Builds an index/data pair (`.fat` / `.dat`) from a directory tree. Every
//! file is keyed by the checksum of its case-folded relative path (or by a
//! literal hex key under an `UNKNOWN/` directory), deduplicated first-wins in
//! traversal order, then written in ascending key order with optional
//! compression, a cycling watermark and 16-byte payload alignment.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use tunein_schema::{NameHash, UNKNOWN};

pub mod compress;
pub mod format;

pub use compress::Codec;
pub use format::{ALIGNMENT, FatEntry, FatIndex, Scheme};

/// Errors raised while packing or reading an archive.
#[derive(Error, Debug)]
pub enum PackError {
    /// A source or output file could not be accessed.
    #[error("Archive IO error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Low-level stream error without a path.
    #[error("Archive IO error: {0}")]
    Stream(#[from] std::io::Error),

    /// The directory walk failed.
    #[error("Failed to walk {}: {message}", root.display())]
    Walk {
        /// Directory being walked.
        root: PathBuf,
        /// Walk error.
        message: String,
    },

    /// A file under `UNKNOWN/` is not named after a hex key.
    #[error("Invalid literal key '{stem}' for {}", path.display())]
    InvalidKey {
        /// Offending file.
        path: PathBuf,
        /// Parsed stem.
        stem: String,
    },

    /// A value does not fit its index field.
    #[error("{field} {value} does not fit the archive index")]
    Overflow {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u64,
    },

    /// The index is malformed.
    #[error("Invalid archive index: {0}")]
    Format(String),
}

/// Packing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Text cycled into entry author words.
    pub watermark: Option<String>,
    /// Try to compress entries.
    pub compress: bool,
    /// Compression codec.
    pub codec: Codec,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            watermark: None,
            compress: true,
            codec: Codec::Deflate,
        }
    }
}

/// Result of one pack run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Written index file.
    pub index_path: PathBuf,
    /// Written data file.
    pub data_path: PathBuf,
    /// Number of entries written.
    pub entries: usize,
    /// Files dropped because their key was already taken.
    pub duplicates: usize,
    /// Entries stored compressed.
    pub compressed: usize,
    /// Size of the data file.
    pub data_size: u64,
}

/// Data file belonging to an index path (`x.fat` → `x.dat`).
pub fn data_path_for(index_path: &Path) -> PathBuf {
    index_path.with_extension("dat")
}

/// Key of a file at `relative` (below the packed root).
///
/// Returns `Ok(None)` for files under `UNKNOWN/` with an empty stem.
///
/// # Errors
///
/// Returns [`PackError::InvalidKey`] if a literal key is not hex.
pub fn entry_key(relative: &Path) -> Result<Option<NameHash>, PackError> {
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let Some(first) = segments.first() else {
        return Ok(None);
    };

    if first.eq_ignore_ascii_case(UNKNOWN) {
        let file_name = segments.last().map_or("", String::as_str);
        let stem: String = file_name
            .split('.')
            .next()
            .unwrap_or_default()
            .chars()
            .take(16)
            .collect();
        if stem.is_empty() {
            return Ok(None);
        }
        return NameHash::from_hex(&stem)
            .map(Some)
            .map_err(|_| PackError::InvalidKey {
                path: relative.to_path_buf(),
                stem,
            });
    }

    Ok(Some(NameHash::of_path(&segments.join("\\"))))
}

/// Walk `root` and map every file to its key, first occurrence wins.
///
/// Directory entries are visited depth-first, sorted by file name. Symbolic
/// links are followed, so a linked file is packed under the link's path.
/// Returns the surviving entries and the number of dropped duplicates.
///
/// # Errors
///
/// Returns an error if the walk fails or a literal key is invalid.
pub fn collect_entries(root: &Path) -> Result<(BTreeMap<NameHash, PathBuf>, usize), PackError> {
    let mut entries = BTreeMap::new();
    let mut duplicates = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name() {
        let entry = entry.map_err(|e| PackError::Walk {
            root: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let Some(key) = entry_key(relative)? else {
            debug!("Skipping {}: empty literal key", relative.display());
            continue;
        };

        if entries.contains_key(&key) {
            debug!("Skipping {}: key {key} already taken", relative.display());
            duplicates += 1;
            continue;
        }
        entries.insert(key, entry.path().to_path_buf());
    }

    Ok((entries, duplicates))
}

/// Cycles watermark bytes into 32-bit author words.
#[derive(Debug)]
struct Watermark {
    bytes: Vec<u8>,
    cursor: usize,
}

impl Watermark {
    fn new(text: Option<&str>) -> Self {
        Self {
            bytes: text.map(|t| t.as_bytes().to_vec()).unwrap_or_default(),
            cursor: 0,
        }
    }

    fn next_word(&mut self) -> u32 {
        if self.bytes.is_empty() {
            return 0;
        }
        let mut word = 0u32;
        for shift in [24, 16, 8, 0] {
            if self.cursor >= self.bytes.len() {
                self.cursor = 0;
            }
            word |= u32::from(self.bytes[self.cursor]) << shift;
            self.cursor += 1;
        }
        word
    }
}

fn size_field(value: usize, field: &'static str) -> Result<u32, PackError> {
    u32::try_from(value).map_err(|_| PackError::Overflow {
        field,
        value: value as u64,
    })
}

/// Pack `source_dir` into `index_path` and `data_path`.
///
/// # Errors
///
/// Any failure is an archive error: unreadable sources, output write
/// failures, invalid literal keys or sizes that overflow the index.
pub fn pack(
    source_dir: &Path,
    index_path: &Path,
    data_path: &Path,
    options: &PackOptions,
) -> Result<PackSummary, PackError> {
    let (pending, duplicates) = collect_entries(source_dir)?;
    info!(
        "Packing {} file(s) from {} into {}",
        pending.len(),
        source_dir.display(),
        index_path.display()
    );
    write_archive(pending, duplicates, index_path, data_path, options)
}

/// Write already collected entries, in key order, into the archive pair.
fn write_archive(
    pending: BTreeMap<NameHash, PathBuf>,
    duplicates: usize,
    index_path: &Path,
    data_path: &Path,
    options: &PackOptions,
) -> Result<PackSummary, PackError> {

    let data_err = |source| PackError::Io {
        path: data_path.to_path_buf(),
        source,
    };
    let mut output = BufWriter::new(File::create(data_path).map_err(data_err)?);

    let mut watermark = Watermark::new(options.watermark.as_deref());
    let try_compress = options.compress && options.codec == Codec::Deflate;
    let mut index = FatIndex::default();
    let mut offset = 0u64;
    let mut compressed = 0;

    for (name_hash, path) in pending {
        let raw = std::fs::read(&path).map_err(|source| PackError::Io {
            path: path.clone(),
            source,
        })?;

        let mut payload = None;
        if try_compress {
            let packed = compress::deflate(&raw).map_err(|source| PackError::Io {
                path: path.clone(),
                source,
            })?;
            if packed.len() < raw.len() {
                payload = Some(packed);
            }
        }
        let (scheme, bytes) = match &payload {
            Some(packed) => (Scheme::Deflate, packed.as_slice()),
            None => (Scheme::Stored, raw.as_slice()),
        };
        if scheme == Scheme::Deflate {
            compressed += 1;
        }

        output.write_all(bytes).map_err(data_err)?;
        let end = offset + bytes.len() as u64;
        let aligned = end.next_multiple_of(ALIGNMENT);
        // Padding is at most 15 bytes.
        output
            .write_all(&[0u8; ALIGNMENT as usize][..(aligned - end) as usize])
            .map_err(data_err)?;

        debug!(
            "{name_hash} {} ({} -> {} bytes, {scheme}) @ {offset:#x}",
            path.display(),
            raw.len(),
            bytes.len()
        );

        index.entries.push(FatEntry {
            name_hash,
            author: watermark.next_word(),
            offset,
            uncompressed_size: size_field(raw.len(), "uncompressed size")?,
            compressed_size: size_field(bytes.len(), "compressed size")?,
            scheme,
        });
        offset = aligned;
    }

    output.flush().map_err(data_err)?;
    index.save(index_path)?;

    Ok(PackSummary {
        index_path: index_path.to_path_buf(),
        data_path: data_path.to_path_buf(),
        entries: index.entries.len(),
        duplicates,
        compressed,
        data_size: offset,
    })
}

/// Read and decompress one entry's payload from a data file.
///
/// # Errors
///
/// Returns an error if the data file cannot be read or the payload is corrupt.
pub fn read_payload(data_path: &Path, entry: &FatEntry) -> Result<Vec<u8>, PackError> {
    let io_err = |source| PackError::Io {
        path: data_path.to_path_buf(),
        source,
    };
    let mut file = File::open(data_path).map_err(io_err)?;
    file.seek(SeekFrom::Start(entry.offset)).map_err(io_err)?;
    let mut stored = vec![0u8; entry.compressed_size as usize];
    file.read_exact(&mut stored).map_err(io_err)?;

    match entry.scheme {
        Scheme::Stored => Ok(stored),
        Scheme::Deflate => {
            compress::inflate(&stored, entry.uncompressed_size as usize).map_err(io_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tunein_schema::checksum;

    fn tree(files: &[(&str, &[u8])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn pack_tree(dir: &TempDir, options: &PackOptions) -> (TempDir, PackSummary) {
        let out = tempfile::tempdir().unwrap();
        let index = out.path().join("Radio_TEST_data.fat");
        let summary = pack(dir.path(), &index, &data_path_for(&index), options).unwrap();
        (out, summary)
    }

    #[test]
    fn keys_follow_relative_paths() {
        assert_eq!(
            entry_key(Path::new("dir/c.txt")).unwrap(),
            Some(NameHash::new(checksum("dir\\c.txt")))
        );
        assert_eq!(
            entry_key(Path::new("Sound/Radio_ABCD.FSB")).unwrap(),
            Some(NameHash::new(0x3d91_bbe4_48c2_f96b))
        );
    }

    #[test]
    fn literal_keys_under_unknown() {
        assert_eq!(
            entry_key(Path::new("UNKNOWN/00ff.bin")).unwrap(),
            Some(NameHash::new(0xFF))
        );
        assert_eq!(
            entry_key(Path::new("unknown/sub/0123456789ABCDEF01.x.y")).unwrap(),
            Some(NameHash::new(0x0123_4567_89AB_CDEF))
        );
        assert_eq!(entry_key(Path::new("UNKNOWN/.hidden")).unwrap(), None);
        assert!(matches!(
            entry_key(Path::new("UNKNOWN/readme.txt")),
            Err(PackError::InvalidKey { .. })
        ));
    }

    #[test]
    fn watermark_cycles_across_entries() {
        let mut mark = Watermark::new(Some("TuneinCrew"));
        assert_eq!(mark.next_word(), u32::from_be_bytes(*b"Tune"));
        assert_eq!(mark.next_word(), u32::from_be_bytes(*b"inCr"));
        assert_eq!(mark.next_word(), u32::from_be_bytes(*b"ewTu"));
        assert_eq!(mark.next_word(), u32::from_be_bytes(*b"nein"));

        let mut short = Watermark::new(Some("ab"));
        assert_eq!(short.next_word(), u32::from_be_bytes(*b"abab"));

        let mut blank = Watermark::new(None);
        assert_eq!(blank.next_word(), 0);
    }

    #[test]
    fn entries_are_sorted_and_aligned() {
        let dir = tree(&[
            ("a.txt", b"alpha"),
            ("b.txt", &[7u8; 300]),
            ("dir/c.txt", b"gamma!"),
        ]);
        let (_out, summary) = pack_tree(&dir, &PackOptions::default());
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.compressed, 1);

        let index = FatIndex::load(&summary.index_path).unwrap();
        let keys: Vec<u64> = index.entries.iter().map(|e| e.name_hash.value()).collect();
        assert_eq!(
            keys,
            vec![0x1678_c7fe_78ac_0236, 0x478c_c7fe_7960_0000, 0x478c_c7fe_7bb0_0000]
        );
        assert!(index.entries.iter().all(|e| e.offset % ALIGNMENT == 0));
        assert_eq!(summary.data_size % ALIGNMENT, 0);

        let b = &index.entries[1];
        assert_eq!(b.scheme, Scheme::Deflate);
        assert_eq!(b.uncompressed_size, 300);
        assert_eq!(
            read_payload(&summary.data_path, b).unwrap(),
            vec![7u8; 300]
        );
        let a = &index.entries[2];
        assert_eq!(a.scheme, Scheme::Stored);
        assert_eq!(read_payload(&summary.data_path, a).unwrap(), b"alpha");
    }

    #[test]
    fn packing_is_deterministic() {
        let dir = tree(&[("x/one.bin", &[1u8; 64]), ("two.bin", b"2")]);
        let options = PackOptions {
            watermark: Some("TuneinCrew".to_string()),
            ..PackOptions::default()
        };
        let (_o1, first) = pack_tree(&dir, &options);
        let (_o2, second) = pack_tree(&dir, &options);
        assert_eq!(
            std::fs::read(&first.index_path).unwrap(),
            std::fs::read(&second.index_path).unwrap()
        );
        assert_eq!(
            std::fs::read(&first.data_path).unwrap(),
            std::fs::read(&second.data_path).unwrap()
        );
    }

    #[test]
    fn duplicate_keys_keep_first_in_traversal_order() {
        // Same key through case folding; "A" sorts before "a".
        let dir = tree(&[("A.TXT", b"upper"), ("a.txt", b"lower")]);
        if std::fs::read_dir(dir.path()).unwrap().count() < 2 {
            // Case-insensitive filesystem: only one file exists.
            return;
        }
        let (_out, summary) = pack_tree(&dir, &PackOptions::default());
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.duplicates, 1);

        let index = FatIndex::load(&summary.index_path).unwrap();
        assert_eq!(
            read_payload(&summary.data_path, &index.entries[0]).unwrap(),
            b"upper"
        );
    }

    #[test]
    fn literal_key_collides_with_hashed_path() {
        let literal = format!("UNKNOWN/{:016X}.bin", checksum("z.txt"));
        let dir = tree(&[(literal.as_str(), b"literal"), ("z.txt", b"hashed")]);
        let (_out, summary) = pack_tree(&dir, &PackOptions::default());
        assert_eq!(summary.entries, 1);

        let index = FatIndex::load(&summary.index_path).unwrap();
        assert_eq!(
            read_payload(&summary.data_path, &index.entries[0]).unwrap(),
            b"literal"
        );
    }

    #[test]
    fn empty_directory_gives_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (_out, summary) = pack_tree(&dir, &PackOptions::default());
        assert_eq!(summary.entries, 0);
        assert_eq!(std::fs::read(&summary.data_path).unwrap().len(), 0);
        assert!(FatIndex::load(&summary.index_path).unwrap().entries.is_empty());
    }

    #[test]
    fn compression_can_be_disabled() {
        let dir = tree(&[("big.bin", &[0u8; 1024])]);
        let options = PackOptions {
            compress: false,
            ..PackOptions::default()
        };
        let (_out, summary) = pack_tree(&dir, &options);
        let index = FatIndex::load(&summary.index_path).unwrap();
        assert_eq!(index.entries[0].scheme, Scheme::Stored);
        assert_eq!(index.entries[0].compressed_size, 1024);
        assert_eq!(index.entries[0].author, 0);
    }

    #[test]
    fn watermark_lands_in_author_words() {
        let dir = tree(&[("a.txt", b"1"), ("b.txt", b"2")]);
        let options = PackOptions {
            watermark: Some("TuneinCrew".to_string()),
            ..PackOptions::default()
        };
        let (_out, summary) = pack_tree(&dir, &options);
        let index = FatIndex::load(&summary.index_path).unwrap();
        // b.txt sorts first by key.
        assert_eq!(index.entries[0].author, u32::from_be_bytes(*b"Tune"));
        assert_eq!(index.entries[1].author, u32::from_be_bytes(*b"inCr"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_packed() {
        let outside = tree(&[("target.sbao", b"linked payload")]);
        let dir = tree(&[("real.txt", b"real")]);
        std::os::unix::fs::symlink(
            outside.path().join("target.sbao"),
            dir.path().join("linked.sbao"),
        )
        .unwrap();

        let (entries, duplicates) = collect_entries(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(duplicates, 0);
        assert_eq!(
            entries.get(&NameHash::of_path("linked.sbao")),
            Some(&dir.path().join("linked.sbao"))
        );

        let (_out, summary) = pack_tree(&dir, &PackOptions::default());
        let index = FatIndex::load(&summary.index_path).unwrap();
        let linked = index
            .entries
            .iter()
            .find(|e| e.name_hash == NameHash::of_path("linked.sbao"))
            .unwrap();
        assert_eq!(
            read_payload(&summary.data_path, linked).unwrap(),
            b"linked payload"
        );
    }

    #[test]
    fn unreadable_source_is_an_io_error() {
        let dir = tree(&[("a.txt", b"1"), ("b.txt", b"2")]);
        let (pending, duplicates) = collect_entries(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("b.txt")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let index = out.path().join("Radio_TEST_data.fat");
        let err = write_archive(
            pending,
            duplicates,
            &index,
            &data_path_for(&index),
            &PackOptions::default(),
        )
        .unwrap_err();
        match err {
            PackError::Io { path, .. } => assert_eq!(path, dir.path().join("b.txt")),
            other => panic!("expected an I/O error, got {other:?}"),
        }
        assert!(!index.exists());
    }
}
