//! Progress reporting for feed fetches and ETL runs.
//!
//! [`ProgressCallback`] keeps the pipeline independent of how progress is
//! rendered. The CLI supplies `indicatif` bars; tests and library callers
//! use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates. Shared across tasks, so `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of units (records, zones).
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Updates the phase message.
    fn set_message(&self, msg: String);

    /// Marks the work done with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
