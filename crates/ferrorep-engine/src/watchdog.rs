//! Periodic heartbeat for a running copy phase
//!
//! A privileged command can stay silent for a long time while it copies one
//! large file, so a background tick keeps progress and throughput moving from
//! the shared counters. The tick never scans the destination.

use crate::context::RunContext;
use crate::rate::RateEstimator;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running watchdog
#[derive(Debug)]
pub struct Watchdog {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Start ticking at the run mode's interval
    pub fn spawn(ctx: Arc<RunContext>) -> Self {
        let interval = ctx.config.watchdog.interval_for(ctx.mode);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut rate = RateEstimator::new(ctx.config.watchdog.rate_alpha);
            debug!(run_id = %ctx.run_id, ?interval, "watchdog started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        rate.record(ctx.tracker.bytes(), Instant::now());
                        ctx.tracker.set_throughput(rate.mbps());
                        if ctx.mode.is_privileged() && !ctx.control.is_paused() {
                            ctx.reporter.advance_copy().await;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(run_id = %ctx.run_id, "watchdog shutdown requested");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop ticking and wait for the background task to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!("watchdog task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RunControl;
    use crate::failures::FailureLog;
    use crate::parser::OutputParser;
    use crate::progress::{ProgressReporter, ProgressTracker};
    use ferrorep_config::Config;
    use ferrorep_types::{
        NullProgressSink, PrivilegeMode, ProgressSink, ProgressUpdate, ReplicationRequest,
        ReplicationResult, RunId,
    };
    use ferrorep_zerocopy::ZeroCopyEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSink {
        updates: AtomicUsize,
    }

    impl ProgressSink for CountingSink {
        fn report_progress(&self, _update: &ProgressUpdate) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }

        fn report_completion(&self, _result: &ReplicationResult) {}
    }

    fn context(mode: PrivilegeMode, sink: Arc<dyn ProgressSink>) -> Arc<RunContext> {
        let mut config = Config::default();
        config.watchdog.root_interval_ms = 10;
        config.watchdog.unprivileged_interval_ms = 10;
        let run_id = RunId::new();
        let tracker = Arc::new(ProgressTracker::new(run_id, mode));
        let reporter =
            ProgressReporter::new(Arc::clone(&tracker), sink, None, Duration::from_secs(1), 95);
        Arc::new(RunContext {
            run_id,
            request: ReplicationRequest::new("/src", "id"),
            mode,
            channel: None,
            config: Arc::new(config),
            control: RunControl::new(),
            tracker,
            reporter,
            failures: FailureLog::new(),
            zerocopy: ZeroCopyEngine::new(),
            parser: OutputParser::new(),
            sub_root: "/src".into(),
            destination_root: "/dst".into(),
        })
    }

    #[tokio::test]
    async fn test_privileged_ticks_publish_heartbeats() {
        let sink = Arc::new(CountingSink::default());
        let ctx = context(PrivilegeMode::RootBatch, sink.clone());
        ctx.tracker.set_total(10);
        ctx.tracker.add_processed(5);

        let watchdog = Watchdog::spawn(Arc::clone(&ctx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        watchdog.stop().await;

        assert!(sink.updates.load(Ordering::Relaxed) >= 1);
        assert_eq!(ctx.tracker.percent(), 47);
    }

    #[tokio::test]
    async fn test_unprivileged_ticks_only_refresh_throughput() {
        let sink = Arc::new(CountingSink::default());
        let ctx = context(PrivilegeMode::UnprivilegedConcurrent, sink.clone());
        let watchdog = Watchdog::spawn(Arc::clone(&ctx));
        for _ in 0..5 {
            ctx.tracker.add_bytes(1024 * 1024);
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        watchdog.stop().await;

        assert_eq!(sink.updates.load(Ordering::Relaxed), 0);
        assert!(ctx.tracker.snapshot().throughput_mbps > 0.0);
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let ctx = context(PrivilegeMode::RootBatch, Arc::new(NullProgressSink));
        let watchdog = Watchdog::spawn(ctx);
        tokio::time::timeout(Duration::from_secs(1), watchdog.stop())
            .await
            .unwrap();
    }
}
