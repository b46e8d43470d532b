//! Pack command

use anyhow::{Context, Result, bail};
use std::path::Path;

use tunein_core::BuildConfig;
use tunein_core::pack::{self, data_path_for};

use crate::ui::theme::format_size;

/// Pack `source` into `index` and its data file.
///
/// The watermark and compression defaults come from the user config and
/// `TUNEIN_*` variables; flags override both.
pub fn pack(
    source: &Path,
    index: &Path,
    data: Option<&Path>,
    watermark: Option<String>,
    no_compress: bool,
) -> Result<()> {
    if !source.is_dir() {
        bail!("{} is not a directory", source.display());
    }

    let mut config = BuildConfig::load_default().context("Failed to load config")?;
    config.apply_env().context("Invalid environment")?;
    if let Some(watermark) = watermark {
        config.pack.watermark = watermark;
    }
    if no_compress {
        config.pack.compress = false;
    }

    let data_path = data.map_or_else(|| data_path_for(index), Path::to_path_buf);
    let summary = pack::pack(source, index, &data_path, &config.pack_options())
        .with_context(|| format!("Failed to pack {}", source.display()))?;

    println!(
        "Packed {} entries ({} compressed, {} duplicate(s) dropped), {}",
        summary.entries,
        summary.compressed,
        summary.duplicates,
        format_size(summary.data_size)
    );
    println!("  {}", summary.index_path.display());
    println!("  {}", summary.data_path.display());
    Ok(())
}
