//! Build pipeline typestate.
//!
//! Each entity moves through explicit states; a transition consumes the
//! previous state, so a bundle can only be written from a packed archive,
//! which can only be packed from staged records, and so on:
//!
//! ```text
//! Parsed --[synthesize()]--> RecordsSynthesized --[build_audio()]--> AudioBuilt
//!        --[stage()]--> Staged --[pack()]--> Packed --[bundle()]--> Bundled
//! ```
//!
//! Every state owns the entity's [`StagingContext`], which removes the
//! scratch directory when the build is dropped at any point.
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = BuildOrchestrator::new(config, NullReporter);
//! let summary = orchestrator.run(&project)?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, warn};

use tunein_schema::{Entity, EntityId};

use crate::audio::{AudioTool, CancelToken, ToolError};
use crate::bundle::{ManifestWriter, write_bundle};
use crate::config::BuildConfig;
use crate::descriptor::{DescriptorWriter, PathStyle};
use crate::error::{BuildError, BuildResult};
use crate::pack::{self, PackOptions, PackSummary};
use crate::paths;
use crate::project::Project;
use crate::records::{RecordSet, RecordSynthesizer};
use crate::reporter::Reporter;
use crate::staging::StagingContext;
use crate::template::TemplateSet;

/// File the audio tool's output is captured in, inside the staging directory.
const TOOL_LOG: &str = "audio-tool.log";

/// Everything loaded once per run and shared by every entity.
#[derive(Debug)]
pub struct Toolchain {
    records: RecordSynthesizer,
    descriptors: DescriptorWriter,
    manifest: ManifestWriter,
    tool: AudioTool,
    pack: PackOptions,
    project_dir: PathBuf,
    output_dir: PathBuf,
    staging_root: Option<PathBuf>,
}

impl Toolchain {
    /// Load templates and resolve the audio tool.
    ///
    /// # Errors
    ///
    /// Returns an error if a template is unusable or the tool cannot be found.
    pub fn load(config: &BuildConfig, project_dir: &Path, cancel: CancelToken) -> BuildResult<Self> {
        let templates = TemplateSet::new(config.resolve_assets_dir());
        let tool = AudioTool::from_config(config, project_dir)?.with_cancel(cancel);
        let style = match tool.prefix() {
            Some(_) => PathStyle::Wine {
                drive: tool.wine_drive().to_string(),
            },
            None => PathStyle::Native,
        };

        Ok(Self {
            records: RecordSynthesizer::load(&templates)?,
            descriptors: DescriptorWriter::load(&templates)?.with_path_style(style),
            manifest: ManifestWriter::load(&templates)?,
            tool,
            pack: config.pack_options(),
            project_dir: project_dir.to_path_buf(),
            output_dir: config
                .output_dir
                .clone()
                .unwrap_or_else(|| project_dir.to_path_buf()),
            staging_root: None,
        })
    }

    /// Create staging directories inside `root` instead of the system temp dir.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Directory receiving the bundles.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn staging(&self) -> BuildResult<StagingContext> {
        match &self.staging_root {
            Some(root) => StagingContext::new_in(root).map_err(|e| BuildError::io(root, e)),
            None => StagingContext::new().map_err(|e| BuildError::io(std::env::temp_dir(), e)),
        }
    }
}

/// State 1: a validated entity with a fresh staging directory.
#[derive(Debug)]
pub struct Parsed;

/// State 2: record documents built, logo texture staged.
#[derive(Debug)]
pub struct RecordsSynthesized {
    records: RecordSet,
}

/// State 3: audio tool outputs moved into the data tree.
#[derive(Debug)]
pub struct AudioBuilt {
    records: RecordSet,
    sound: Vec<PathBuf>,
}

/// State 4: record documents written into the output tree.
#[derive(Debug)]
pub struct Staged {
    written: Vec<PathBuf>,
}

/// State 5: data tree packed into the archive pair.
#[derive(Debug)]
pub struct Packed {
    archive: PackSummary,
}

/// State 6: manifest and zip written.
#[derive(Debug)]
pub struct Bundled {
    /// Final bundle.
    pub bundle: PathBuf,
    /// Archive that went into it.
    pub archive: PackSummary,
}

/// One entity on its way through the pipeline.
#[derive(Debug)]
pub struct EntityBuild<'a, S> {
    entity: &'a Entity,
    staging: StagingContext,
    state: S,
}

impl<'a, S> EntityBuild<'a, S> {
    /// Entity being built.
    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// Scratch directory of this build.
    pub fn staging(&self) -> &StagingContext {
        &self.staging
    }

    /// Current state payload.
    pub fn state(&self) -> &S {
        &self.state
    }

    fn id(&self) -> &'a EntityId {
        &self.entity.id
    }

    fn advance<T>(self, state: T) -> EntityBuild<'a, T> {
        EntityBuild {
            entity: self.entity,
            staging: self.staging,
            state,
        }
    }
}

impl<'a> EntityBuild<'a, Parsed> {
    /// Validate `entity` and allocate its staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Validation`] for an invalid entity.
    pub fn new(entity: &'a Entity, toolchain: &Toolchain) -> BuildResult<Self> {
        entity
            .validate()
            .map_err(|e| BuildError::Validation(format!("{}: {e}", entity.id)))?;
        Ok(Self {
            entity,
            staging: toolchain.staging()?,
            state: Parsed,
        })
    }

    /// Build the record documents and stage the logo texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the logo texture cannot be written.
    pub fn synthesize(self, toolchain: &Toolchain) -> BuildResult<EntityBuild<'a, RecordsSynthesized>> {
        let records = toolchain
            .records
            .synthesize(self.entity, self.staging.data_dir())?;
        Ok(self.advance(RecordsSynthesized { records }))
    }
}

impl<'a> EntityBuild<'a, RecordsSynthesized> {
    /// Generate (or reuse) the descriptor and run the audio tool on it.
    ///
    /// An existing `Radio_{id}.fdp` next to the project is handed to the tool
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ExternalTool`] if the tool fails.
    pub fn build_audio(self, toolchain: &Toolchain) -> BuildResult<EntityBuild<'a, AudioBuilt>> {
        let id = self.id();
        let descriptor = toolchain.project_dir.join(paths::descriptor_file(id));
        if descriptor.is_file() {
            warn!(
                "{} already exists, using it as is (delete it to regenerate)",
                descriptor.display()
            );
        } else {
            toolchain.descriptors.write(self.entity, &descriptor)?;
            info!("Generated {}", descriptor.display());
        }

        let sound_dir = self.staging.sound_dir().map_err(|e| {
            BuildError::io(self.staging.data_dir().join("sound"), e)
        })?;
        let log = self.staging.path().join(TOOL_LOG);
        let sound = toolchain
            .tool
            .build(id, &descriptor, &sound_dir, &log)
            .map_err(BuildError::from)?;

        let RecordsSynthesized { records } = self.state;
        Ok(EntityBuild {
            entity: self.entity,
            staging: self.staging,
            state: AudioBuilt { records, sound },
        })
    }
}

impl<'a> EntityBuild<'a, AudioBuilt> {
    /// Audio files staged for packing.
    pub fn sound_files(&self) -> &[PathBuf] {
        &self.state.sound
    }

    /// Write the record documents into the output tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be written.
    pub fn stage(self) -> BuildResult<EntityBuild<'a, Staged>> {
        let written = self.state.records.save(self.staging.output_dir())?;
        Ok(self.advance(Staged { written }))
    }
}

impl<'a> EntityBuild<'a, Staged> {
    /// Record documents in the output tree.
    pub fn written(&self) -> &[PathBuf] {
        &self.state.written
    }

    /// Pack the data tree into `Radio_{id}_data.fat` / `.dat`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ArchiveIo`], which stops the whole run.
    pub fn pack(self, toolchain: &Toolchain) -> BuildResult<EntityBuild<'a, Packed>> {
        let stem = paths::archive_stem(self.id());
        let index_path = self.staging.output_dir().join(format!("{stem}.fat"));
        let data_path = pack::data_path_for(&index_path);
        let archive = pack::pack(
            self.staging.data_dir(),
            &index_path,
            &data_path,
            &toolchain.pack,
        )?;
        Ok(self.advance(Packed { archive }))
    }
}

impl<'a> EntityBuild<'a, Packed> {
    /// Write the manifest and zip the output tree into the output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest or the zip cannot be written.
    pub fn bundle(self, toolchain: &Toolchain) -> BuildResult<EntityBuild<'a, Bundled>> {
        let id = self.id();
        toolchain
            .manifest
            .write(self.entity, self.staging.output_dir())?;

        std::fs::create_dir_all(&toolchain.output_dir)
            .map_err(|e| BuildError::io(&toolchain.output_dir, e))?;
        let bundle = toolchain.output_dir.join(paths::bundle_file(id));
        write_bundle(self.staging.output_dir(), &bundle)?;

        let Packed { archive } = self.state;
        Ok(EntityBuild {
            entity: self.entity,
            staging: self.staging,
            state: Bundled { bundle, archive },
        })
    }
}

impl EntityBuild<'_, Bundled> {
    /// Path of the written bundle.
    pub fn bundle_path(&self) -> &Path {
        &self.state.bundle
    }
}

/// Outcome of a build run.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Bundles written, in build order.
    pub built: Vec<PathBuf>,
    /// Entities that were abandoned, with the reason.
    pub failed: Vec<(EntityId, String)>,
}

impl BuildSummary {
    /// Whether every entity was built.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.built.is_empty()
    }
}

/// Runs the pipeline for every entity of a project.
#[derive(Debug)]
pub struct BuildOrchestrator<R: Reporter> {
    config: BuildConfig,
    reporter: R,
    cancel: CancelToken,
    staging_root: Option<PathBuf>,
}

impl<R: Reporter> BuildOrchestrator<R> {
    /// Create an orchestrator for `config`.
    pub fn new(config: BuildConfig, reporter: R) -> Self {
        Self {
            config,
            reporter,
            cancel: CancelToken::new(),
            staging_root: None,
        }
    }

    /// Observe `cancel`; once set, the running tool is killed and the
    /// remaining entities are skipped.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create staging directories inside `root`.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Effective configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build every entity of `project`, one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error ([`BuildError::is_fatal`]); every other
    /// failure only abandons the entity it happened in.
    pub fn run(&self, project: &Project) -> BuildResult<BuildSummary> {
        let start = Instant::now();
        let mut summary = BuildSummary::default();
        self.reporter.section("Building radios");

        let toolchain = match Toolchain::load(&self.config, &project.dir, self.cancel.clone()) {
            Ok(toolchain) => toolchain,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let reason = e.to_string();
                for entity in &project.entities {
                    self.fail(&mut summary, &entity.id, &reason);
                }
                self.reporter
                    .summary(0, summary.failed.len(), start.elapsed().as_secs_f64());
                return Ok(summary);
            }
        };
        let toolchain = match &self.staging_root {
            Some(root) => toolchain.with_staging_root(root),
            None => toolchain,
        };
        self.reporter.info(&format!(
            "Audio tool: {}",
            toolchain.tool.program().display()
        ));
        if !project.rejected.is_empty() {
            self.reporter.warning(&format!(
                "{} declaration(s) in the project were skipped",
                project.rejected.len()
            ));
        }

        for entity in &project.entities {
            if self.cancel.is_cancelled() {
                self.fail(&mut summary, &entity.id, &ToolError::Cancelled.to_string());
                continue;
            }

            self.reporter.entity_started(&entity.id, &entity.name);
            match self.build_entity(entity, &toolchain) {
                Ok(bundle) => {
                    self.reporter
                        .entity_done(&entity.id, &bundle.display().to_string());
                    summary.built.push(bundle);
                }
                Err(e) if e.is_fatal() => {
                    self.reporter.entity_failed(&entity.id, &e.to_string());
                    self.reporter.error(&format!("{}: {e}, aborting run", entity.id));
                    return Err(e);
                }
                Err(e) => self.fail(&mut summary, &entity.id, &e.to_string()),
            }
        }

        self.reporter.summary(
            summary.built.len(),
            summary.failed.len(),
            start.elapsed().as_secs_f64(),
        );
        Ok(summary)
    }

    fn build_entity(&self, entity: &Entity, toolchain: &Toolchain) -> BuildResult<PathBuf> {
        let id = &entity.id;
        let build = EntityBuild::new(entity, toolchain)?;

        self.reporter.stage(id, "Synthesizing records");
        let build = build.synthesize(toolchain)?;

        self.reporter.stage(id, "Building audio");
        let build = build.build_audio(toolchain)?;

        self.reporter.stage(id, "Staging");
        let build = build.stage()?;

        self.reporter.stage(id, "Packing");
        let build = build.pack(toolchain)?;
        info!(
            "{id}: packed {} entries ({} duplicate(s) dropped)",
            build.state.archive.entries, build.state.archive.duplicates
        );

        self.reporter.stage(id, "Bundling");
        let build = build.bundle(toolchain)?;
        Ok(build.bundle_path().to_path_buf())
    }

    fn fail(&self, summary: &mut BuildSummary, id: &EntityId, reason: &str) {
        error!("{id}: {reason}");
        self.reporter.entity_failed(id, reason);
        summary.failed.push((id.clone(), reason.to_string()));
    }
}
