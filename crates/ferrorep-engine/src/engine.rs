//! Replication engine facade
//!
//! One [`ReplicationEngine`] serves any number of runs. Each run gets its own
//! [`RunContext`]; the engine only keeps a registry of run controls so that
//! runs can be paused, resumed or cancelled by identifier.

use crate::context::RunContext;
use crate::control::RunControl;
use crate::executor::CopyExecutor;
use crate::failures::FailureLog;
use crate::parser::OutputParser;
use crate::partition::{partition_async, Partition};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::selector::{ChannelSet, ModeSelector, Selection};
use crate::verify::verify;
use crate::watchdog::Watchdog;
use ferrorep_config::Config;
use ferrorep_types::{
    Error, Identifiable, JobStatusStore, NullProgressSink, PrivilegeMode, ProbeSignals,
    ProgressSink, ProgressUpdate, ReplicationPhase, ReplicationRequest, ReplicationResult,
    ReplicationStatus, Result, RunId,
};
use ferrorep_zerocopy::{ZeroCopyConfig, ZeroCopyEngine};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct RunEntry {
    control: RunControl,
    tracker: Arc<ProgressTracker>,
}

struct EngineInner {
    config: Arc<Config>,
    channels: ChannelSet,
    selector: ModeSelector,
    sink: Arc<dyn ProgressSink>,
    store: Option<Arc<dyn JobStatusStore>>,
    runs: RwLock<HashMap<RunId, RunEntry>>,
}

/// Drops a run from the registry when its task ends, panics included
struct Registration {
    inner: Arc<EngineInner>,
    run_id: RunId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Ok(mut runs) = self.inner.runs.try_write() {
            runs.remove(&self.run_id);
            return;
        }
        let inner = Arc::clone(&self.inner);
        let run_id = self.run_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    inner.runs.write().await.remove(&run_id);
                });
            }
            Err(_) => warn!(run_id = %run_id, "run registry busy, entry left behind"),
        }
    }
}

/// Entry point for replication runs
#[derive(Clone)]
pub struct ReplicationEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ReplicationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationEngine")
            .field("channels", &self.inner.channels)
            .field("selector", &self.inner.selector)
            .field("has_store", &self.inner.store.is_some())
            .finish()
    }
}

impl ReplicationEngine {
    /// Create an engine with no progress sink and no status store
    pub fn new(config: Config, channels: ChannelSet) -> Self {
        EngineBuilder::new().config(config).channels(channels).build()
    }

    /// Start building an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Probe the configured channels without starting a run
    pub async fn probe(&self) -> ProbeSignals {
        self.inner.selector.probe(&self.inner.channels).await
    }

    /// Mode a run started now would use
    pub async fn selected_mode(&self) -> Result<PrivilegeMode> {
        Ok(self.inner.selector.select(&self.inner.channels).await?.mode)
    }

    /// Run a request to completion under a fresh run identifier
    pub async fn replicate(&self, request: ReplicationRequest) -> Result<ReplicationResult> {
        self.replicate_as(RunId::new(), request).await
    }

    /// Run a request to completion under a caller-chosen identifier
    pub async fn replicate_as(
        &self,
        run_id: RunId,
        request: ReplicationRequest,
    ) -> Result<ReplicationResult> {
        let control = RunControl::new();
        let tracker = self.register(run_id, control.clone()).await?;
        self.drive(run_id, request, control, tracker).await
    }

    /// Spawn a run and return a handle to it
    pub async fn start(&self, request: ReplicationRequest) -> Result<RunHandle> {
        self.start_with_control(RunId::new(), request, RunControl::new())
            .await
    }

    /// Spawn a run with a caller-held control
    pub async fn start_with_control(
        &self,
        run_id: RunId,
        request: ReplicationRequest,
        control: RunControl,
    ) -> Result<RunHandle> {
        let tracker = self.register(run_id, control.clone()).await?;
        let engine = self.clone();
        let run_control = control.clone();
        let run_tracker = Arc::clone(&tracker);
        let join = tokio::spawn(async move {
            engine
                .drive(run_id, request, run_control, run_tracker)
                .await
        });
        Ok(RunHandle {
            run_id,
            control,
            tracker,
            join,
        })
    }

    async fn entry(&self, run_id: RunId) -> Result<RunEntry> {
        self.inner
            .runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(Error::UnknownRun { run_id })
    }

    /// Cancel an active run
    pub async fn cancel(&self, run_id: RunId) -> Result<()> {
        self.entry(run_id).await?.control.cancel();
        info!(run_id = %run_id, "cancel requested");
        Ok(())
    }

    /// Pause an active run
    pub async fn pause(&self, run_id: RunId) -> Result<()> {
        self.entry(run_id).await?.control.pause();
        Ok(())
    }

    /// Resume a paused run
    pub async fn resume(&self, run_id: RunId) -> Result<()> {
        self.entry(run_id).await?.control.resume();
        Ok(())
    }

    /// Current progress of an active run
    pub async fn progress(&self, run_id: RunId) -> Result<ProgressUpdate> {
        Ok(self.entry(run_id).await?.tracker.snapshot())
    }

    /// Identifiers of runs still in flight
    pub async fn active_runs(&self) -> Vec<RunId> {
        self.inner.runs.read().await.keys().copied().collect()
    }

    async fn register(&self, run_id: RunId, control: RunControl) -> Result<Arc<ProgressTracker>> {
        let mut runs = self.inner.runs.write().await;
        if runs.contains_key(&run_id) {
            return Err(Error::other(format!("run {} is already active", run_id)));
        }
        let tracker = Arc::new(ProgressTracker::new(
            run_id,
            PrivilegeMode::UnprivilegedConcurrent,
        ));
        runs.insert(
            run_id,
            RunEntry {
                control,
                tracker: Arc::clone(&tracker),
            },
        );
        Ok(tracker)
    }

    async fn drive(
        &self,
        run_id: RunId,
        request: ReplicationRequest,
        control: RunControl,
        tracker: Arc<ProgressTracker>,
    ) -> Result<ReplicationResult> {
        let _registration = Registration {
            inner: Arc::clone(&self.inner),
            run_id,
        };
        self.run(run_id, request, control, tracker).await
    }

    /// Sub-root and destination root for a request; nothing is touched yet
    fn validate(&self, request: &ReplicationRequest) -> Result<(PathBuf, String)> {
        let source_root = &request.source_root;
        if !source_root.is_dir() {
            return Err(Error::setup(format!(
                "source root '{}' does not exist or is not a directory",
                source_root.display()
            )));
        }
        let layout = &self.inner.config.layout;
        let sub_root = source_root.join(layout.source_subtree(&request.destination_identity));
        if !sub_root.is_dir() {
            return Err(Error::setup(format!(
                "required subtree '{}' is missing",
                sub_root.display()
            )));
        }
        Ok((
            sub_root,
            layout.destination_root(&request.destination_identity),
        ))
    }

    async fn prepare(&self, request: &ReplicationRequest) -> Result<(PathBuf, String, Selection)> {
        let (sub_root, destination_root) = self.validate(request)?;
        let selection = self.inner.selector.select(&self.inner.channels).await?;
        Ok((sub_root, destination_root, selection))
    }

    async fn run(
        &self,
        run_id: RunId,
        request: ReplicationRequest,
        control: RunControl,
        tracker: Arc<ProgressTracker>,
    ) -> Result<ReplicationResult> {
        let started = Instant::now();
        let config = Arc::clone(&self.inner.config);
        let reporter = ProgressReporter::new(
            Arc::clone(&tracker),
            Arc::clone(&self.inner.sink),
            self.inner.store.clone(),
            config.progress.status_interval(),
            config.watchdog.copy_band_ceiling,
        );
        info!(
            run_id = %run_id,
            source = %request.source_root.display(),
            identity = %request.destination_identity,
            incremental = request.incremental,
            "replication started"
        );

        let (sub_root, destination_root, selection) = match self.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(abort(&reporter, run_id, e).await),
        };
        tracker.set_mode(selection.mode);

        let zerocopy = ZeroCopyEngine::with_config(ZeroCopyConfig {
            enabled: config.transfer.zero_copy,
            min_file_size: config.transfer.zero_copy_min_size,
        });
        let ctx = Arc::new(RunContext {
            run_id,
            request,
            mode: selection.mode,
            channel: selection.channel,
            config,
            control,
            tracker,
            reporter,
            failures: FailureLog::new(),
            zerocopy,
            parser: OutputParser::new(),
            sub_root,
            destination_root,
        });

        match replicate_in(&ctx, started).await {
            Ok(result) => Ok(result),
            Err(e) => Err(abort(&ctx.reporter, run_id, e).await),
        }
    }
}

async fn abort(reporter: &ProgressReporter, run_id: RunId, error: Error) -> Error {
    error!(
        run_id = %run_id,
        kind = ?error.kind(),
        severity = ?error.severity(),
        recoverable = error.is_recoverable(),
        "replication aborted: {}",
        error
    );
    reporter.tracker().set_phase(ReplicationPhase::Failed);
    reporter.emit().await;
    error
}

async fn scan(ctx: &RunContext) -> Result<Partition> {
    ctx.tracker.set_phase(ReplicationPhase::Scanning);
    ctx.reporter.emit().await;
    let partition = partition_async(
        ctx.sub_root.clone(),
        ctx.destination_root.clone(),
        ctx.config.partition,
    )
    .await?;
    if !partition.unreadable.is_empty() {
        warn!(
            run_id = %ctx.run_id,
            count = partition.unreadable.len(),
            "some source directories could not be listed"
        );
    }
    ctx.tracker.set_total(partition.total_files);
    Ok(partition)
}

fn final_status(cancelled: bool, exit_clean: bool, total: u64, processed: u64, failed: bool) -> ReplicationStatus {
    if cancelled {
        ReplicationStatus::Cancelled
    } else if !exit_clean || (total > 0 && processed == 0) {
        ReplicationStatus::Failed
    } else if failed {
        ReplicationStatus::PartialSuccess
    } else {
        ReplicationStatus::Success
    }
}

async fn replicate_in(ctx: &Arc<RunContext>, started: Instant) -> Result<ReplicationResult> {
    let partition = Arc::new(scan(ctx).await?);

    ctx.tracker.set_phase(ReplicationPhase::Replacing);
    ctx.reporter.emit().await;
    let watchdog = Watchdog::spawn(Arc::clone(ctx));
    let outcome = CopyExecutor::new(Arc::clone(ctx))
        .execute(Arc::clone(&partition))
        .await;
    watchdog.stop().await;
    let outcome = outcome?;
    if !ctx.mode.is_privileged() {
        let stats = ctx.zerocopy.stats();
        debug!(
            run_id = %ctx.run_id,
            zero_copy = stats.zero_copy_transfers,
            fallback = stats.fallback_transfers,
            efficiency = stats.efficiency(),
            "in-process transfers finished"
        );
    }

    let verified = if !outcome.cancelled && ctx.config.verification.enabled {
        ctx.tracker.set_phase(ReplicationPhase::Verifying);
        ctx.reporter.emit().await;
        verify(ctx, &partition.manifest).await?.verified
    } else {
        0
    };

    let cancelled = outcome.cancelled || ctx.control.is_cancelled();
    let total = ctx.tracker.total();
    let processed = ctx.tracker.processed().min(total);
    let failures = ctx.failures.deduplicated();
    let status = final_status(
        cancelled,
        outcome.exit_clean,
        total,
        processed,
        !failures.is_empty(),
    );

    let phase = match status {
        ReplicationStatus::Cancelled => ReplicationPhase::Cancelled,
        ReplicationStatus::Failed => ReplicationPhase::Failed,
        ReplicationStatus::Success | ReplicationStatus::PartialSuccess => {
            ctx.tracker.raise_percent(100);
            ReplicationPhase::Completed
        }
    };
    ctx.tracker.set_processed(processed);
    ctx.tracker.set_phase(phase);

    let result = ReplicationResult {
        run_id: ctx.run_id,
        mode: ctx.mode,
        status,
        total_files: total,
        processed_count: processed,
        verified_count: verified.min(processed),
        bytes_copied: ctx.tracker.bytes(),
        failures,
        elapsed: started.elapsed(),
    };
    ctx.reporter.complete(&result).await;

    info!(
        run_id = %ctx.run_id,
        mode = %result.mode,
        status = %result.status,
        total = result.total_files,
        processed = result.processed_count,
        verified = result.verified_count,
        failures = result.failures.len(),
        elapsed = ?result.elapsed,
        "replication finished"
    );
    Ok(result)
}

/// Builder for [`ReplicationEngine`]
pub struct EngineBuilder {
    config: Config,
    channels: ChannelSet,
    sink: Arc<dyn ProgressSink>,
    store: Option<Arc<dyn JobStatusStore>>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("channels", &self.channels)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Builder with the default configuration and no privileged channels
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            channels: ChannelSet::default(),
            sink: Arc::new(NullProgressSink),
            store: None,
        }
    }

    /// Use this configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Offer these privileged channels
    pub fn channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }

    /// Send live progress to this sink
    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Persist throttled progress and results to this store
    pub fn status_store(mut self, store: Arc<dyn JobStatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the engine
    pub fn build(self) -> ReplicationEngine {
        let selector = ModeSelector::from_config(&self.config);
        ReplicationEngine {
            inner: Arc::new(EngineInner {
                config: Arc::new(self.config),
                channels: self.channels,
                selector,
                sink: self.sink,
                store: self.store,
                runs: RwLock::new(HashMap::new()),
            }),
        }
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    control: RunControl,
    tracker: Arc<ProgressTracker>,
    join: JoinHandle<Result<ReplicationResult>>,
}

impl RunHandle {
    /// Run identifier
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Control shared with the run
    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Pause the run at its next checkpoint
    pub fn pause(&self) {
        self.control.pause();
    }

    /// Resume a paused run
    pub fn resume(&self) {
        self.control.resume();
    }

    /// Cancel the run cooperatively
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Whether the run is paused
    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Current progress
    pub fn progress(&self) -> ProgressUpdate {
        self.tracker.snapshot()
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> Result<ReplicationResult> {
        self.join
            .await
            .map_err(|e| Error::other(format!("run task failed: {}", e)))?
    }
}

impl Identifiable for RunHandle {
    fn run_id(&self) -> RunId {
        self.run_id
    }
}
