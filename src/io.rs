//! User-facing reporting seams.
//!
//! Warnings that should reach the user (not only the log) go through
//! [`WarningSink`]; transfer progress goes through [`ProgressSink`]. Both have
//! no-op defaults so embedders only wire what they need. Logging itself is
//! carried by `tracing` throughout the crate.

/// Receives user-visible warnings, e.g. an unresolved GraphQL import.
pub trait WarningSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Receives progress updates for a single transport call. `increment` is the
/// delta since the previous report, not a cumulative percentage.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, increment: f64);
}

/// Default sink that drops all warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWarningSink;

impl WarningSink for NullWarningSink {
    fn warn(&self, _message: &str) {}
}
