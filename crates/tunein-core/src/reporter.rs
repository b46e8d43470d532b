//! Reporter trait for dependency injection
//!
//! Lets the pipeline report per-entity progress without being coupled to a
//! specific terminal frontend.

use tunein_schema::EntityId;

pub trait Reporter: Send + Sync {
    /// A new section of the run has started (e.g. "Building radios").
    fn section(&self, title: &str);

    /// Work on an entity has started.
    fn entity_started(&self, id: &EntityId, name: &str);

    /// An entity moved to a new pipeline stage.
    fn stage(&self, id: &EntityId, stage: &str);

    /// An entity finished; `detail` names the bundle that was written.
    fn entity_done(&self, id: &EntityId, detail: &str);

    /// An entity was abandoned.
    fn entity_failed(&self, id: &EntityId, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final tally.
    fn summary(&self, built: usize, failed: usize, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title)
    }
    fn entity_started(&self, id: &EntityId, name: &str) {
        (**self).entity_started(id, name)
    }
    fn stage(&self, id: &EntityId, stage: &str) {
        (**self).stage(id, stage)
    }
    fn entity_done(&self, id: &EntityId, detail: &str) {
        (**self).entity_done(id, detail)
    }
    fn entity_failed(&self, id: &EntityId, reason: &str) {
        (**self).entity_failed(id, reason)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
    fn summary(&self, built: usize, failed: usize, elapsed_secs: f64) {
        (**self).summary(built, failed, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn entity_started(&self, _: &EntityId, _: &str) {}
    fn stage(&self, _: &EntityId, _: &str) {}
    fn entity_done(&self, _: &EntityId, _: &str) {}
    fn entity_failed(&self, _: &EntityId, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: usize, _: f64) {}
}
