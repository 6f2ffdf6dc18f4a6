//! Cooperative pause and cancel control for a single run
//!
//! Every worker passes through [`RunControl::checkpoint`] before each unit of
//! work. Nothing is ever force-terminated: a cancelled run leaves whatever it
//! already copied in place, and re-running the same request is the recovery
//! path.

use ferrorep_types::Cancellable;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// What a worker should do after a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Carry on with the next unit of work
    Proceed,
    /// Stop launching work; the run is winding down
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancelled: bool,
}

/// Run-scoped pause toggle and latched cancel flag
#[derive(Debug, Clone)]
pub struct RunControl {
    state: Arc<watch::Sender<ControlState>>,
}

impl RunControl {
    /// Create a control in the running state
    pub fn new() -> Self {
        let (state, _) = watch::channel(ControlState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Pause the run; ignored once cancelled
    pub fn pause(&self) {
        self.state.send_if_modified(|state| {
            if state.cancelled || state.paused {
                return false;
            }
            state.paused = true;
            true
        });
        debug!("run paused");
    }

    /// Resume a paused run
    pub fn resume(&self) {
        self.state.send_if_modified(|state| {
            let changed = state.paused;
            state.paused = false;
            changed
        });
        debug!("run resumed");
    }

    /// Latch the cancel flag and release any paused workers
    pub fn cancel(&self) {
        self.state.send_modify(|state| {
            state.cancelled = true;
            state.paused = false;
        });
        debug!("run cancelled");
    }

    /// Whether the run is paused
    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Whether cancel has been requested
    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// Wait while paused, then report whether to proceed
    pub async fn checkpoint(&self) -> Checkpoint {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.cancelled {
                return Checkpoint::Cancelled;
            }
            if !state.paused {
                return Checkpoint::Proceed;
            }
            if rx.changed().await.is_err() {
                return Checkpoint::Cancelled;
            }
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable for RunControl {
    fn cancel(&self) {
        RunControl::cancel(self);
    }

    fn is_cancelled(&self) -> bool {
        RunControl::is_cancelled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_checkpoint_proceeds_when_running() {
        let control = RunControl::new();
        assert_eq!(control.checkpoint().await, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn test_checkpoint_blocks_while_paused() {
        let control = RunControl::new();
        control.pause();
        assert!(control.is_paused());

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.checkpoint().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        control.resume();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_workers() {
        let control = RunControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.checkpoint().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        control.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Checkpoint::Cancelled);
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_pause_after_cancel_is_ignored() {
        let control = RunControl::new();
        control.cancel();
        control.pause();
        assert!(!control.is_paused());
        assert!(control.is_cancelled());
        assert_eq!(control.checkpoint().await, Checkpoint::Cancelled);
    }

    #[test]
    fn test_resume_wakes_pending_checkpoint() {
        let control = RunControl::new();
        control.pause();
        let mut checkpoint = tokio_test::task::spawn(control.checkpoint());
        tokio_test::assert_pending!(checkpoint.poll());

        control.resume();
        assert!(checkpoint.is_woken());
        assert_eq!(tokio_test::assert_ready!(checkpoint.poll()), Checkpoint::Proceed);
    }

    #[test]
    fn test_cancellable_trait() {
        let control = RunControl::new();
        let cancellable: &dyn Cancellable = &control;
        cancellable.cancel();
        assert!(cancellable.is_cancelled());
    }
}
