//! Core library for tunein: turns a radio project into a mod manager bundle.
//!
//! The pipeline per radio is record synthesis ([`records`]), audio descriptor
//! and tool ([`descriptor`], [`audio`]), archive packing ([`pack`]) and
//! bundling ([`bundle`]), sequenced by [`orchestrator`].

pub mod audio;
pub mod bundle;
pub mod config;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod pack;
pub mod paths;
pub mod project;
pub mod records;
pub mod staging;
pub mod template;

pub mod reporter;

pub use config::BuildConfig;
pub use error::{BuildError, BuildResult};
pub use orchestrator::{BuildOrchestrator, BuildSummary};
pub use project::Project;
pub use reporter::{NullReporter, Reporter};
