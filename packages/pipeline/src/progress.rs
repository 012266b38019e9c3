//! Progress reporting for batch runs.
//!
//! The batch driver reports one unit per finished city through a
//! [`ProgressCallback`]. Rendering (progress bars, log lines, nothing)
//! is chosen by the caller.

use std::sync::Arc;

/// Receives progress updates from a batch run.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// by all in-flight cities.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of cities.
    fn set_total(&self, total: u64);

    /// Advance by `delta` finished cities.
    fn inc(&self, delta: u64);

    /// Update the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Mark the run as complete with a final message.
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

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
