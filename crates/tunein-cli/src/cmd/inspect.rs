//! Inspect command

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use std::path::Path;

use tunein_core::pack::{FatEntry, FatIndex, data_path_for, read_payload};

use crate::ui::theme::format_size;

/// List the entries of an index file, optionally reading every payload back.
pub fn inspect(index_path: &Path, verify: bool) -> Result<()> {
    let index = FatIndex::load(index_path)
        .with_context(|| format!("Failed to read {}", index_path.display()))?;

    println!();
    println!(
        "  {} {}",
        index_path.display().to_string().white().bold(),
        format!("platform {}, {} entries", index.platform, index.entries.len()).dark_grey()
    );
    println!();
    let header = format!(
        "{:<18}{:>10}{:>12}{:>12}  {:<8}{}",
        "KEY", "OFFSET", "SIZE", "PACKED", "SCHEME", "AUTHOR"
    );
    println!("  {}", header.dark_grey());
    for entry in &index.entries {
        println!(
            "  {}{:>10}{:>12}{:>12}  {:<8}{}",
            format!("{:<18}", entry.name_hash.to_string()).cyan(),
            format!("{:#x}", entry.offset),
            format_size(u64::from(entry.uncompressed_size)),
            format_size(u64::from(entry.compressed_size)),
            entry.scheme.to_string(),
            author_text(entry)
        );
    }

    if verify {
        let data_path = data_path_for(index_path);
        let mut broken = 0;
        for entry in &index.entries {
            match read_payload(&data_path, entry) {
                Ok(bytes) if bytes.len() == entry.uncompressed_size as usize => {}
                Ok(bytes) => {
                    broken += 1;
                    println!(
                        "  {} {} expected {} bytes, got {}",
                        "✗".red(),
                        entry.name_hash,
                        entry.uncompressed_size,
                        bytes.len()
                    );
                }
                Err(e) => {
                    broken += 1;
                    println!("  {} {} {e}", "✗".red(), entry.name_hash);
                }
            }
        }
        println!();
        if broken > 0 {
            bail!("{broken} of {} entries failed verification", index.entries.len());
        }
        println!("  {} all payloads readable", "✓".green());
    }
    Ok(())
}

/// Author word as text when it is printable, hex otherwise.
fn author_text(entry: &FatEntry) -> String {
    let bytes = entry.author.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        format!("{:08X}", entry.author)
    }
}
