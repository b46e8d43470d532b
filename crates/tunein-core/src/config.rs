//! Build configuration.
//!
//! Values are layered, lowest to highest precedence: built-in defaults, the
//! user config file (`~/.tunein/config.toml` or `--config`), the project
//! descriptor, `TUNEIN_*` environment variables, then command-line flags
//! (applied by the caller on the returned struct).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pack::{Codec, PackOptions};

/// Default watermark stamped into archive entries.
pub const DEFAULT_WATERMARK: &str = "TuneinCrew";

/// Default wine drive used to translate host paths.
pub const DEFAULT_WINE_DRIVE: &str = "Z:";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`BuildConfig`].
    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A value from the environment is malformed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// External audio tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Tool executable (absolute, relative to the project, or a bare name on `PATH`).
    pub path: Option<PathBuf>,
    /// Launcher placed in front of the tool (e.g. `wine`).
    pub prefix: Option<String>,
    /// Drive the launcher maps the host root to.
    pub wine_drive: String,
    /// Kill the tool after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: None,
            prefix: None,
            wine_drive: DEFAULT_WINE_DRIVE.to_string(),
            timeout_secs: None,
        }
    }
}

/// Archive packing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Text cycled into entry author words; blank disables it.
    pub watermark: String,
    /// Try to compress entries.
    pub compress: bool,
    /// Compression codec.
    pub codec: Codec,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            watermark: DEFAULT_WATERMARK.to_string(),
            compress: true,
            codec: Codec::Deflate,
        }
    }
}

/// Complete configuration of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Audio tool settings.
    pub tool: ToolConfig,
    /// Packing settings.
    pub pack: PackConfig,
    /// Template directory; defaults to `assets/` next to the executable.
    pub assets_dir: Option<PathBuf>,
    /// Where bundles are written; defaults to the project directory.
    pub output_dir: Option<PathBuf>,
}

impl BuildConfig {
    /// Parse a TOML config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document does not match.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load the user config file if one exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        match crate::paths::config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Layer the tool settings of a project descriptor on top.
    pub fn merge_project(&mut self, tool: Option<&Path>, prefix: Option<&str>) {
        if let Some(tool) = tool {
            self.tool.path = Some(tool.to_path_buf());
        }
        if let Some(prefix) = prefix.filter(|p| !p.trim().is_empty()) {
            self.tool.prefix = Some(prefix.to_string());
        }
    }

    /// Layer `TUNEIN_*` variables from the process environment on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for a malformed timeout.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Layer environment values obtained through `lookup` on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for a malformed timeout.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(tool) = lookup("TUNEIN_FMOD") {
            self.tool.path = Some(PathBuf::from(tool));
        }
        if let Some(assets) = lookup("TUNEIN_ASSETS") {
            self.assets_dir = Some(PathBuf::from(assets));
        }
        if let Some(watermark) = lookup("TUNEIN_WATERMARK") {
            self.pack.watermark = watermark;
        }
        if let Some(timeout) = lookup("TUNEIN_TOOL_TIMEOUT") {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: "TUNEIN_TOOL_TIMEOUT",
                    value: timeout.clone(),
                })?;
            self.tool.timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Tool timeout, if one is configured (zero means none).
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool
            .timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    /// Options handed to the archive packer.
    pub fn pack_options(&self) -> PackOptions {
        let watermark = self.pack.watermark.trim();
        PackOptions {
            watermark: (!watermark.is_empty()).then(|| watermark.to_string()),
            compress: self.pack.compress,
            codec: self.pack.codec,
        }
    }

    /// Template directory to use.
    ///
    /// Falls back to `assets/` next to the running executable, then to
    /// `assets/` in the working directory.
    pub fn resolve_assets_dir(&self) -> PathBuf {
        if let Some(dir) = &self.assets_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("assets")))
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("assets"))
    }
}
