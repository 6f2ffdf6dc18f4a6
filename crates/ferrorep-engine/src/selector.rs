//! Privilege mode selection
//!
//! Root access gives the lowest per-file overhead, the brokered service is the
//! next fastest privileged path, and direct unprivileged copying always works.
//! The choice is made once per run and never revised.

use ferrorep_config::Config;
use ferrorep_types::{CommandChannel, Error, PrivilegeMode, ProbeKind, ProbeSignals, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pick a mode from availability signals: root, then brokered, then unprivileged
pub fn select_mode(signals: ProbeSignals) -> PrivilegeMode {
    if signals.root_available {
        PrivilegeMode::RootBatch
    } else if signals.brokered_available {
        PrivilegeMode::BrokeredBatch
    } else {
        PrivilegeMode::UnprivilegedConcurrent
    }
}

/// Privileged channels that may be offered to a run
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    /// Local root shell
    pub root: Option<Arc<dyn CommandChannel>>,
    /// Out-of-process privileged broker
    pub brokered: Option<Arc<dyn CommandChannel>>,
}

impl ChannelSet {
    /// No privileged channel at all
    pub fn unprivileged_only() -> Self {
        Self::default()
    }

    /// Offer a root channel
    pub fn with_root(mut self, channel: Arc<dyn CommandChannel>) -> Self {
        self.root = Some(channel);
        self
    }

    /// Offer a brokered channel
    pub fn with_brokered(mut self, channel: Arc<dyn CommandChannel>) -> Self {
        self.brokered = Some(channel);
        self
    }

    /// Channel that serves a mode, if any
    pub fn channel_for(&self, mode: PrivilegeMode) -> Option<Arc<dyn CommandChannel>> {
        match mode {
            PrivilegeMode::RootBatch => self.root.clone(),
            PrivilegeMode::BrokeredBatch => self.brokered.clone(),
            PrivilegeMode::UnprivilegedConcurrent => None,
        }
    }
}

/// Chosen mode plus the channel bound to the run
#[derive(Debug, Clone)]
pub struct Selection {
    /// Mode for the whole run
    pub mode: PrivilegeMode,
    /// Channel for privileged modes
    pub channel: Option<Arc<dyn CommandChannel>>,
}

/// Probes channels and binds one mode to a run
#[derive(Debug, Clone)]
pub struct ModeSelector {
    probe_timeout: Duration,
    mode_override: Option<PrivilegeMode>,
}

impl ModeSelector {
    /// Create a selector with a per-probe time bound
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            mode_override: None,
        }
    }

    /// Selector configured from the `channels` section and `mode_override`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.channels.probe_timeout()).with_override(config.mode_override)
    }

    /// Pin a mode instead of following probe precedence
    pub fn with_override(mut self, mode: Option<PrivilegeMode>) -> Self {
        self.mode_override = mode;
        self
    }

    async fn probe_one(&self, channel: Option<&Arc<dyn CommandChannel>>, kind: ProbeKind) -> bool {
        let Some(channel) = channel else {
            return false;
        };
        match tokio::time::timeout(self.probe_timeout, channel.probe(kind)).await {
            Ok(available) => {
                debug!(channel = channel.name(), available, "probe finished");
                available
            }
            Err(_) => {
                warn!(
                    channel = channel.name(),
                    "probe timed out after {:?}", self.probe_timeout
                );
                false
            }
        }
    }

    /// Ask each offered channel to prove it is usable
    pub async fn probe(&self, channels: &ChannelSet) -> ProbeSignals {
        let (root_available, brokered_available) = tokio::join!(
            self.probe_one(channels.root.as_ref(), ProbeKind::Root),
            self.probe_one(channels.brokered.as_ref(), ProbeKind::Liveness),
        );
        ProbeSignals {
            root_available,
            brokered_available,
        }
    }

    /// Choose the mode for a run and bind its channel
    ///
    /// Only fails when a pinned privileged mode is unavailable.
    pub async fn select(&self, channels: &ChannelSet) -> Result<Selection> {
        let mode = match self.mode_override {
            Some(PrivilegeMode::UnprivilegedConcurrent) => PrivilegeMode::UnprivilegedConcurrent,
            Some(pinned) => {
                let available = match pinned {
                    PrivilegeMode::RootBatch => {
                        self.probe_one(channels.root.as_ref(), ProbeKind::Root).await
                    }
                    _ => {
                        self.probe_one(channels.brokered.as_ref(), ProbeKind::Liveness)
                            .await
                    }
                };
                if !available {
                    return Err(Error::setup(format!(
                        "pinned mode {} is unavailable",
                        pinned
                    )));
                }
                pinned
            }
            None => select_mode(self.probe(channels).await),
        };

        info!(mode = %mode, "privilege mode selected");
        Ok(Selection {
            mode,
            channel: channels.channel_for(mode),
        })
    }
}
