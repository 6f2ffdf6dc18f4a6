//! Progress tracking and the two publication cadences
//!
//! Workers and the watchdog write into one [`ProgressTracker`] per run. The
//! [`ProgressReporter`] turns tracker snapshots into [`ProgressUpdate`]s: every
//! emission goes to the live sink, while the job status store only sees one
//! every `status_interval` plus the terminal update.

use ferrorep_types::{
    FailureRecord, JobStatusStore, PrivilegeMode, ProgressSink, ProgressUpdate, ReplicationPhase,
    ReplicationResult, RunId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug)]
struct TrackerState {
    mode: PrivilegeMode,
    current_item: String,
    phase: ReplicationPhase,
    percent: u8,
    throughput_mbps: f64,
}

/// Shared mutable progress state of one run
#[derive(Debug)]
pub struct ProgressTracker {
    run_id: RunId,
    total: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    bytes: AtomicU64,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Create a zeroed tracker
    pub fn new(run_id: RunId, mode: PrivilegeMode) -> Self {
        Self {
            run_id,
            total: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            state: Mutex::new(TrackerState {
                mode,
                current_item: String::new(),
                phase: ReplicationPhase::Scanning,
                percent: 0,
                throughput_mbps: 0.0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run this tracker belongs to
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Record the mode once it is selected
    pub fn set_mode(&self, mode: PrivilegeMode) {
        self.state().mode = mode;
    }

    /// Mode of the run
    pub fn mode(&self) -> PrivilegeMode {
        self.state().mode
    }

    /// Set the number of files in the source tree
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    /// Files in the source tree
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Count processed files and return the new total
    pub fn add_processed(&self, count: u64) -> u64 {
        self.processed.fetch_add(count, Ordering::AcqRel) + count
    }

    /// Overwrite the processed count (destination recount)
    pub fn set_processed(&self, processed: u64) {
        self.processed.store(processed, Ordering::Release);
    }

    /// Files reported copied so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Count a per-item error
    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::AcqRel);
    }

    /// Per-item errors so far
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    /// Count transferred bytes
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Bytes transferred so far
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Set the most recently touched item
    pub fn set_current_item<S: Into<String>>(&self, item: S) {
        self.state().current_item = item.into();
    }

    /// Enter a new phase
    pub fn set_phase(&self, phase: ReplicationPhase) {
        self.state().phase = phase;
    }

    /// Current phase
    pub fn phase(&self) -> ReplicationPhase {
        self.state().phase
    }

    /// Raise the published percent; it never goes backwards
    pub fn raise_percent(&self, percent: u8) -> u8 {
        let mut state = self.state();
        state.percent = state.percent.max(percent.min(100));
        state.percent
    }

    /// Published percent
    pub fn percent(&self) -> u8 {
        self.state().percent
    }

    /// Percent implied by the processed counter, scaled into `0..=ceiling`
    pub fn copy_percent(&self, ceiling: u8) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let processed = self.processed().min(total);
        ((processed as u128 * u128::from(ceiling)) / u128::from(total)) as u8
    }

    /// Store the latest smoothed throughput
    pub fn set_throughput(&self, mbps: f64) {
        self.state().throughput_mbps = mbps;
    }

    /// Capture the current state as an update
    pub fn snapshot(&self) -> ProgressUpdate {
        let processed = self.processed();
        let total = self.total();
        let state = self.state();
        ProgressUpdate {
            run_id: self.run_id,
            mode: state.mode,
            processed,
            total,
            current_item: state.current_item.clone(),
            percent: state.percent,
            phase: state.phase,
            throughput_mbps: state.throughput_mbps,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Fans tracker snapshots out to the live sink and the job status store
pub struct ProgressReporter {
    tracker: Arc<ProgressTracker>,
    sink: Arc<dyn ProgressSink>,
    store: Option<Arc<dyn JobStatusStore>>,
    status_interval: Duration,
    copy_band_ceiling: u8,
    last_store_publish: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("run_id", &self.tracker.run_id())
            .field("has_store", &self.store.is_some())
            .field("status_interval", &self.status_interval)
            .finish()
    }
}

impl ProgressReporter {
    /// Create a reporter over a tracker
    pub fn new(
        tracker: Arc<ProgressTracker>,
        sink: Arc<dyn ProgressSink>,
        store: Option<Arc<dyn JobStatusStore>>,
        status_interval: Duration,
        copy_band_ceiling: u8,
    ) -> Self {
        Self {
            tracker,
            sink,
            store,
            status_interval,
            copy_band_ceiling,
            last_store_publish: Mutex::new(None),
        }
    }

    /// The tracker being reported
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Publish the current state
    pub async fn emit(&self) {
        let update = self.tracker.snapshot();
        self.sink.report_progress(&update);

        if self.should_publish(update.phase) {
            if let Some(store) = &self.store {
                if let Err(e) = store.publish(&update).await {
                    warn!(run_id = %update.run_id, "failed to publish job status: {}", e);
                }
            }
        }
    }

    /// Move the percent up to what the processed counter implies, then emit
    pub async fn advance_copy(&self) {
        let percent = self.tracker.copy_percent(self.copy_band_ceiling);
        self.tracker.raise_percent(percent);
        self.emit().await;
    }

    /// Forward a per-item failure to the sink
    pub fn report_failure(&self, failure: &FailureRecord) {
        self.sink.report_failure(self.tracker.run_id(), failure);
    }

    /// Publish the terminal result on both cadences
    pub async fn complete(&self, result: &ReplicationResult) {
        self.emit().await;
        self.sink.report_completion(result);
        if let Some(store) = &self.store {
            if let Err(e) = store.publish_result(result).await {
                warn!(run_id = %result.run_id, "failed to publish job result: {}", e);
            }
        }
    }

    fn should_publish(&self, phase: ReplicationPhase) -> bool {
        let mut last = self
            .last_store_publish
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let due = phase.is_terminal()
            || last.map_or(true, |at| now.duration_since(at) >= self.status_interval);
        if due {
            *last = Some(now);
        }
        due
    }
}
