//! tunein - custom radio stations for The Crew

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tunein_cli::cmd;
use tunein_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build(args) => cmd::build::build(&args, cli.quiet),
        Commands::Pack {
            source,
            index,
            data,
            watermark,
            no_compress,
        } => cmd::pack::pack(&source, &index, data.as_deref(), watermark, no_compress),
        Commands::Inspect { index, verify } => cmd::inspect::inspect(&index, verify),
        Commands::Hash { texts } => {
            cmd::hash::hash(&texts);
            Ok(())
        }
    }
}
