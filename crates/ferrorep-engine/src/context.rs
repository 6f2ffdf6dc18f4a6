//! Run-scoped state shared by the executor, watchdog and verifier

use crate::control::RunControl;
use crate::failures::FailureLog;
use crate::parser::OutputParser;
use crate::progress::{ProgressReporter, ProgressTracker};
use ferrorep_config::Config;
use ferrorep_types::{
    CommandChannel, Error, FailureRecord, PrivilegeMode, ReplicationRequest, Result, RunId,
};
use ferrorep_zerocopy::ZeroCopyEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Everything one run needs, created at run start and dropped at run end
#[derive(Debug)]
pub struct RunContext {
    /// Run identifier
    pub run_id: RunId,
    /// The request being served
    pub request: ReplicationRequest,
    /// Mode bound for the whole run
    pub mode: PrivilegeMode,
    /// Channel bound to a privileged run
    pub channel: Option<Arc<dyn CommandChannel>>,
    /// Effective configuration
    pub config: Arc<Config>,
    /// Pause and cancel control
    pub control: RunControl,
    /// Shared counters and progress state
    pub tracker: Arc<ProgressTracker>,
    /// Sink and status store fan-out
    pub reporter: ProgressReporter,
    /// Per-item failures
    pub failures: FailureLog,
    /// Direct transfer engine for unprivileged copies
    pub zerocopy: ZeroCopyEngine,
    /// Output classifier for privileged copies
    pub parser: OutputParser,
    /// Required subtree under the source root
    pub sub_root: PathBuf,
    /// Destination root derived from the identity
    pub destination_root: String,
}

impl RunContext {
    /// The bound channel, or a setup error for unprivileged runs
    pub fn channel(&self) -> Result<&Arc<dyn CommandChannel>> {
        self.channel.as_ref().ok_or_else(|| {
            Error::setup(format!("no command channel bound for mode {}", self.mode))
        })
    }

    /// Append a per-item failure and tell the live sink
    pub fn record_failure(&self, failure: FailureRecord) {
        warn!(
            run_id = %self.run_id,
            item = %failure.item,
            "copy failed: {}",
            failure.reason
        );
        self.tracker.add_error();
        self.reporter.report_failure(&failure);
        self.failures.record(failure);
    }
}
