//! Terminal output
//!
//! Progress lines go to stdout through [`ConsoleReporter`]; diagnostics go
//! through `tracing` to stderr.

pub mod reporter;
pub mod theme;

pub use reporter::ConsoleReporter;
