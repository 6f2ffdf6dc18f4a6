//! Core traits for FerroRep operations
//!
//! These are the seams the engine talks through: the progress sink consumed by
//! a UI layer, the durable job-status boundary, and run control.

use crate::{FailureRecord, ProgressUpdate, ReplicationResult, RunId};

#[cfg(feature = "async")]
use crate::{JobStatus, Result};
#[cfg(feature = "async")]
use async_trait::async_trait;

/// Trait for receiving progress during a run
///
/// Called on the engine's own tasks; implementations must not block.
pub trait ProgressSink: Send + Sync {
    /// Report a progress update (un-throttled cadence)
    fn report_progress(&self, update: &ProgressUpdate);

    /// Report a per-item failure as soon as it is observed
    fn report_failure(&self, run_id: RunId, failure: &FailureRecord) {
        let _ = (run_id, failure);
    }

    /// Report the terminal result of the run
    fn report_completion(&self, result: &ReplicationResult);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report_progress(&self, _update: &ProgressUpdate) {}

    fn report_completion(&self, _result: &ReplicationResult) {}
}

/// Durable job-status boundary keyed by run identifier
///
/// Receives the throttled cadence, so implementations may write to disk.
#[cfg(feature = "async")]
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Store the latest progress update of a run
    async fn publish(&self, update: &ProgressUpdate) -> Result<()>;

    /// Store the terminal result of a run
    async fn publish_result(&self, result: &ReplicationResult) -> Result<()>;

    /// Load what is known about a run, if anything
    async fn load(&self, run_id: RunId) -> Result<Option<JobStatus>>;
}

/// Trait for operation cancellation
pub trait Cancellable {
    /// Cancel the operation
    fn cancel(&self);

    /// Check if the operation is cancelled
    fn is_cancelled(&self) -> bool;
}

/// Trait for run identification
pub trait Identifiable {
    /// Get the run ID
    fn run_id(&self) -> RunId;
}
