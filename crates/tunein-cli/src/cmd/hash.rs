//! Hash command

use tunein_schema::{checksum, checksum_hex};

/// Print the archive key and its little-endian hex form for each text.
pub fn hash(texts: &[String]) {
    for text in texts {
        println!("{:016X}  {}  {text}", checksum(text), checksum_hex(text));
    }
}
