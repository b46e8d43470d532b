//! Console implementation of the pipeline reporter

use crossterm::style::Stylize;
use tracing::{debug, error, info, warn};

use tunein_core::Reporter;
use tunein_schema::EntityId;

use super::theme::Icons;

/// Prints per-radio progress; messages are forwarded to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    quiet: bool,
    icons: Icons,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            icons: Icons::default(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            println!();
            println!("{}", title.bold());
        }
    }

    fn entity_started(&self, id: &EntityId, name: &str) {
        if !self.quiet {
            println!(
                "{} {} {}",
                self.icons.active.cyan(),
                id.as_str().white().bold(),
                name.dark_grey()
            );
        }
    }

    fn stage(&self, id: &EntityId, stage: &str) {
        debug!("{id}: {stage}");
    }

    fn entity_done(&self, id: &EntityId, detail: &str) {
        if !self.quiet {
            println!(
                "{} {} {}",
                self.icons.success.green(),
                id.as_str().white().bold(),
                detail.dark_grey()
            );
        }
    }

    fn entity_failed(&self, id: &EntityId, reason: &str) {
        println!(
            "{} {} {}",
            self.icons.error.red(),
            id.as_str().white().bold(),
            reason.lines().next().unwrap_or_default().red()
        );
    }

    fn info(&self, msg: &str) {
        info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        warn!("{} {msg}", self.icons.warning);
    }

    fn error(&self, msg: &str) {
        error!("{msg}");
    }

    fn summary(&self, built: usize, failed: usize, elapsed_secs: f64) {
        if self.quiet && failed == 0 {
            return;
        }
        println!();
        let line = format!("Built {built} radio(s), {failed} failed in {elapsed_secs:.1}s");
        if failed == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line.yellow());
        }
    }
}
