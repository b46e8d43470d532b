//! Build command

use anyhow::{Context, Result, bail};

use tunein_core::{BuildConfig, BuildOrchestrator, Project};

use crate::BuildArgs;
use crate::ui::ConsoleReporter;

/// Build every radio of a project into a bundle.
pub fn build(args: &BuildArgs, quiet: bool) -> Result<()> {
    let project = Project::parse(&args.project)
        .with_context(|| format!("Failed to read project {}", args.project.display()))?;
    if project.entities.is_empty() {
        bail!("No radios found in {}", args.project.display());
    }

    let config = resolve_config(args, &project)?;
    let reporter = ConsoleReporter::new(quiet);
    let summary = BuildOrchestrator::new(config, reporter)
        .run(&project)
        .context("Build aborted")?;

    if summary.built.is_empty() {
        bail!("No radio was built");
    }
    Ok(())
}

/// Layer config file, project, environment and flags, in that order.
fn resolve_config(args: &BuildArgs, project: &Project) -> Result<BuildConfig> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::load_default()?,
    };
    config.merge_project(project.tool.as_deref(), project.prefix.as_deref());
    config.apply_env().context("Invalid environment")?;

    if let Some(assets) = &args.assets {
        config.assets_dir = Some(assets.clone());
    }
    if let Some(output) = &args.output {
        config.output_dir = Some(output.clone());
    }
    if let Some(watermark) = &args.watermark {
        config.pack.watermark.clone_from(watermark);
    }
    if args.no_compress {
        config.pack.compress = false;
    }
    if let Some(timeout) = args.timeout {
        config.tool.timeout_secs = Some(timeout);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn args(project: &Path) -> BuildArgs {
        BuildArgs {
            project: project.to_path_buf(),
            config: None,
            assets: None,
            output: None,
            watermark: None,
            no_compress: false,
            timeout: None,
        }
    }

    #[test]
    fn flags_override_file_and_project() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[tool]\npath = \"from-config\"\ntimeout_secs = 5\n[pack]\nwatermark = \"File\"\n",
        )
        .unwrap();

        let project = Project::parse_str("<project><fmod>from-project</fmod></project>", dir.path())
            .unwrap();

        let mut build_args = args(&dir.path().join("project.xml"));
        build_args.config = Some(config_path);
        build_args.watermark = Some("Flag".to_string());
        build_args.no_compress = true;
        build_args.timeout = Some(60);

        let config = resolve_config(&build_args, &project).unwrap();
        // TUNEIN_FMOD may be set by the caller's environment
        if std::env::var_os("TUNEIN_FMOD").is_none() {
            assert_eq!(config.tool.path, Some(PathBuf::from("from-project")));
        }
        assert_eq!(config.pack.watermark, "Flag");
        assert!(!config.pack.compress);
        assert_eq!(config.tool.timeout_secs, Some(60));
    }
}
