//! Configuration management system for FerroRep
//!
//! This crate provides layered configuration for the replication engine and the
//! CLI, supporting YAML, TOML and JSON files, validation, and environment
//! variable overrides.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: worker counts, intervals and templates are checked at load time
//! - **Environment overrides**: `FERROREP__SECTION__KEY` variables win over files
//! - **Defaults**: every option has a working default
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrorep_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("ferrorep.yaml")
//!     .add_env_prefix("FERROREP")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Privileged workers: {}", config.concurrency.privileged_workers.get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use ferrorep_types::{BatchSize, PartitionLimits, PrivilegeMode, ThreadCount};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Placeholder substituted with the destination identity in layout templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Main configuration structure for FerroRep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool sizes per mode
    pub concurrency: ConcurrencyConfig,
    /// Bulk-task thresholds for the partitioner
    pub partition: PartitionLimits,
    /// Heartbeat cadence and throughput smoothing
    pub watchdog: WatchdogConfig,
    /// Post-copy size checks
    pub verification: VerificationConfig,
    /// In-process copies of the unprivileged mode
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Progress publication cadence
    pub progress: ProgressConfig,
    /// How privileged commands are launched
    pub channels: ChannelsConfig,
    /// Where sources are found and replicas land
    pub layout: LayoutConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Pin a privilege mode instead of probing
    #[serde(default)]
    pub mode_override: Option<PrivilegeMode>,
}

/// Worker pool sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Concurrent shell copies in the root and brokered modes
    pub privileged_workers: ThreadCount,
    /// Concurrent file transfers in the unprivileged mode
    pub unprivileged_workers: ThreadCount,
}

impl ConcurrencyConfig {
    /// Worker count for a given mode
    pub fn workers_for(&self, mode: PrivilegeMode) -> usize {
        if mode.is_privileged() {
            self.privileged_workers.get()
        } else {
            self.unprivileged_workers.get()
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            privileged_workers: ThreadCount::privileged_default(),
            unprivileged_workers: ThreadCount::unprivileged_default(),
        }
    }
}

/// Watchdog and rate estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Heartbeat interval in the root mode
    pub root_interval_ms: u64,
    /// Heartbeat interval in the brokered mode
    pub brokered_interval_ms: u64,
    /// Throughput refresh interval in the unprivileged mode
    pub unprivileged_interval_ms: u64,
    /// Highest percent the copy phase may publish
    pub copy_band_ceiling: u8,
    /// EWMA weight of the newest throughput sample
    pub rate_alpha: f64,
}

impl WatchdogConfig {
    /// Tick interval for a given mode
    pub fn interval_for(&self, mode: PrivilegeMode) -> Duration {
        let millis = match mode {
            PrivilegeMode::RootBatch => self.root_interval_ms,
            PrivilegeMode::BrokeredBatch => self.brokered_interval_ms,
            PrivilegeMode::UnprivilegedConcurrent => self.unprivileged_interval_ms,
        };
        Duration::from_millis(millis)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            root_interval_ms: 300,
            brokered_interval_ms: 500,
            unprivileged_interval_ms: 500,
            copy_band_ceiling: 95,
            rate_alpha: 0.3,
        }
    }
}

/// Verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Run the size check after copying
    pub enabled: bool,
    /// Paths per stat command
    pub batch_size: BatchSize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: BatchSize::default(),
        }
    }
}

/// In-process file transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Try `copy_file_range` before the buffered copy
    pub zero_copy: bool,
    /// Files below this size always take the buffered copy
    pub zero_copy_min_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            zero_copy: true,
            zero_copy_min_size: 4096,
        }
    }
}

/// Progress publication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum gap between writes to the job status store
    pub status_interval_ms: u64,
}

impl ProgressConfig {
    /// Status store throttle as a duration
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 500,
        }
    }
}

/// Launchers for the privileged command channels
///
/// A launcher is a program plus leading arguments; the command string is
/// appended as the final argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Launcher for the local root shell
    pub root_launcher: Vec<String>,
    /// Launcher for the brokered service, if one is installed
    #[serde(default)]
    pub broker_launcher: Option<Vec<String>>,
    /// Upper bound for each availability probe
    pub probe_timeout_ms: u64,
}

impl ChannelsConfig {
    /// Probe bound as a duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            root_launcher: vec!["su".to_string(), "-c".to_string()],
            broker_launcher: None,
            probe_timeout_ms: 3000,
        }
    }
}

/// Source and destination layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Subtree of the source root that must exist; `{id}` is the destination identity
    pub source_subtree: String,
    /// Destination root; must contain `{id}`
    pub destination_template: String,
}

impl LayoutConfig {
    /// Relative path of the required source subtree
    pub fn source_subtree(&self, identity: &str) -> PathBuf {
        PathBuf::from(self.source_subtree.replace(ID_PLACEHOLDER, identity))
    }

    /// Destination root for an identity
    pub fn destination_root(&self, identity: &str) -> String {
        self.destination_template.replace(ID_PLACEHOLDER, identity)
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            source_subtree: ID_PLACEHOLDER.to_string(),
            destination_template: "/var/lib/ferrorep/{id}".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable file logging
    pub enable_file_logging: bool,
    /// Log file path
    pub log_file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_file_logging: false,
            log_file: None,
            json_format: false,
            colored_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals_per_mode() {
        let watchdog = WatchdogConfig::default();
        assert_eq!(
            watchdog.interval_for(PrivilegeMode::RootBatch),
            Duration::from_millis(300)
        );
        assert_eq!(
            watchdog.interval_for(PrivilegeMode::BrokeredBatch),
            Duration::from_millis(500)
        );
        assert_eq!(watchdog.copy_band_ceiling, 95);
    }

    #[test]
    fn test_workers_for_mode() {
        let concurrency = ConcurrencyConfig::default();
        assert_eq!(concurrency.workers_for(PrivilegeMode::BrokeredBatch), 2);
        assert!(concurrency.workers_for(PrivilegeMode::UnprivilegedConcurrent) <= 16);
    }

    #[test]
    fn test_layout_templates() {
        let layout = LayoutConfig {
            source_subtree: "data/{id}".to_string(),
            destination_template: "/srv/replicas/{id}/root".to_string(),
        };
        assert_eq!(layout.source_subtree("app"), PathBuf::from("data/app"));
        assert_eq!(layout.destination_root("app"), "/srv/replicas/app/root");
    }

    #[test]
    fn test_default_root_launcher() {
        let channels = ChannelsConfig::default();
        assert_eq!(channels.root_launcher, vec!["su", "-c"]);
        assert!(channels.broker_launcher.is_none());
        assert_eq!(channels.probe_timeout(), Duration::from_secs(3));
    }
}
