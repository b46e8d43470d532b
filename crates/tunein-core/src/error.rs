//! Build error taxonomy.
//!
//! Every failure inside the pipeline is funnelled into [`BuildError`]; the
//! variant decides the blast radius. Only archive failures stop the whole run,
//! everything else aborts the entity being built.

use std::path::PathBuf;
use thiserror::Error;

use crate::audio::ToolError;
use crate::document::DocumentError;
use crate::pack::PackError;

/// Errors raised while building an entity.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Project or entity data is invalid.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced asset could not be read.
    #[error("Asset not found: {}", path.display())]
    AssetNotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A record template is missing or unusable.
    #[error("Template {name}: {source}")]
    Template {
        /// Template file name.
        name: String,
        /// Underlying document error.
        #[source]
        source: DocumentError,
    },

    /// The audio tool failed.
    #[error(transparent)]
    ExternalTool(#[from] ToolError),

    /// Reading sources or writing the archive failed.
    #[error(transparent)]
    ArchiveIo(#[from] PackError),

    /// Filesystem error outside the archive.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a generated document failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Writing the bundle failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl BuildError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must stop the whole run instead of one entity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ArchiveIo(_))
    }
}

/// Result alias for the build pipeline.
pub type BuildResult<T> = Result<T, BuildError>;
