//! tunein - custom radio stations for The Crew
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Builds PitCrew mod bundles from a radio project file.
//!
//! # Pipeline
//!
//! ```text
//! project.xml ──parse──▶ radios ──records──▶ Radio_{id}_*.xml
//!                          │
//!                          ├──descriptor──▶ Radio_{id}.fdp ──audio tool──▶ .fev/.fsb
//!                          │
//!                          └──pack──▶ Radio_{id}_data.fat/.dat ──bundle──▶ TuneinCrew{id}.zip
//! ```

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tunein")]
#[command(author, version, about = "tunein - custom radio stations for The Crew")]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a mod bundle for every radio in a project file
    Build(BuildArgs),
    /// Pack a directory into a .fat/.dat archive pair
    Pack {
        /// Directory to pack
        source: PathBuf,
        /// Index file to write (.fat)
        index: PathBuf,
        /// Data file to write (defaults to the index path with .dat)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Watermark cycled into entry author words
        #[arg(long)]
        watermark: Option<String>,
        /// Store every entry uncompressed
        #[arg(long)]
        no_compress: bool,
    },
    /// List the entries of a .fat index
    Inspect {
        /// Index file (.fat)
        index: PathBuf,
        /// Read every payload back from the data file
        #[arg(long)]
        verify: bool,
    },
    /// Print the archive checksum of one or more paths
    Hash {
        /// Texts to hash (e.g. sound\Radio_ABCD.fev)
        #[arg(required = true)]
        texts: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Project file
    pub project: PathBuf,
    /// Config file (defaults to ~/.tunein/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Template directory
    #[arg(long)]
    pub assets: Option<PathBuf>,
    /// Where bundles are written (defaults to the project directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Watermark cycled into archive entry author words
    #[arg(long)]
    pub watermark: Option<String>,
    /// Store archive entries uncompressed
    #[arg(long)]
    pub no_compress: bool,
    /// Kill the audio tool after this many seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,
}
