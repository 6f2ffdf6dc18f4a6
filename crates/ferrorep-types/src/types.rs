//! Core data types for FerroRep
//!
//! This module provides the data model shared by the engine, the CLI and any
//! embedding UI: requests, tasks, progress tuples and terminal results.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// File size in bytes
pub type FileSize = u64;

/// Unique identifier of one replication run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Strategy used to reach the privileged destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrivilegeMode {
    /// Bulk shell copies through a local root shell
    RootBatch,
    /// Bulk shell copies through an out-of-process privileged broker
    BrokeredBatch,
    /// Direct per-file copies with ordinary process rights
    UnprivilegedConcurrent,
}

impl PrivilegeMode {
    /// Whether this mode issues commands through a privileged channel
    pub fn is_privileged(self) -> bool {
        !matches!(self, Self::UnprivilegedConcurrent)
    }

    /// Short lowercase label used in logs and status files
    pub fn label(self) -> &'static str {
        match self {
            Self::RootBatch => "root-batch",
            Self::BrokeredBatch => "brokered-batch",
            Self::UnprivilegedConcurrent => "unprivileged-concurrent",
        }
    }
}

impl fmt::Display for PrivilegeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PrivilegeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "root-batch" | "root" => Ok(Self::RootBatch),
            "brokered-batch" | "brokered" => Ok(Self::BrokeredBatch),
            "unprivileged-concurrent" | "unprivileged" => Ok(Self::UnprivilegedConcurrent),
            other => Err(format!("unknown privilege mode '{other}'")),
        }
    }
}

/// Availability signals gathered before a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProbeSignals {
    /// A root shell answered with uid 0
    pub root_available: bool,
    /// The brokered channel is bound and answering
    pub brokered_available: bool,
}

/// Immutable input of one replication run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicationRequest {
    /// Root of the source tree
    pub source_root: PathBuf,
    /// Opaque key naming the destination (e.g. a target namespace)
    pub destination_identity: String,
    /// Skip files that are already up to date at the destination
    pub incremental: bool,
}

impl ReplicationRequest {
    /// Create a full (non-incremental) request
    pub fn new<P: Into<PathBuf>, S: Into<String>>(source_root: P, destination_identity: S) -> Self {
        Self {
            source_root: source_root.into(),
            destination_identity: destination_identity.into(),
            incremental: false,
        }
    }

    /// Set the incremental flag
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }
}

/// One unit of copy work produced by the partitioner
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyTask {
    /// Source file or subtree root
    pub source_entry: PathBuf,
    /// Destination path as handed to the copy command
    pub target_path: String,
    /// Whether the whole subtree is copied by one bulk invocation
    pub is_directory_bulk: bool,
    /// Regular files covered by this task
    pub file_count: u64,
    /// Bytes covered by this task
    pub byte_count: u64,
}

impl CopyTask {
    /// Task copying a single file
    pub fn file<P: Into<PathBuf>, S: Into<String>>(source: P, target: S, size: u64) -> Self {
        Self {
            source_entry: source.into(),
            target_path: target.into(),
            is_directory_bulk: false,
            file_count: 1,
            byte_count: size,
        }
    }

    /// Task copying a whole subtree in one invocation
    pub fn bulk<P: Into<PathBuf>, S: Into<String>>(
        source: P,
        target: S,
        file_count: u64,
        byte_count: u64,
    ) -> Self {
        Self {
            source_entry: source.into(),
            target_path: target.into(),
            is_directory_bulk: true,
            file_count,
            byte_count,
        }
    }

    /// Name shown as the current item when the task starts
    pub fn display_name(&self) -> String {
        self.source_entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_entry.display().to_string())
    }
}

/// A regular source file recorded during partitioning
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifestEntry {
    /// Absolute source path
    pub source: PathBuf,
    /// Destination path the file is copied to
    pub target: String,
    /// Source size in bytes
    pub size: FileSize,
}

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReplicationPhase {
    /// Walking the source tree
    Scanning,
    /// Copy commands in flight
    Replacing,
    /// Post-copy size checks
    Verifying,
    /// Finished normally
    Completed,
    /// Stopped by a cancel request
    Cancelled,
    /// Stopped by a run-level error
    Failed,
}

impl ReplicationPhase {
    /// Whether no further updates follow this phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for ReplicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scanning => "scanning",
            Self::Replacing => "replacing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Progress tuple delivered to sinks and the job status store
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressUpdate {
    /// Run this update belongs to
    pub run_id: RunId,
    /// Mode of the run
    pub mode: PrivilegeMode,
    /// Files reported copied so far
    pub processed: u64,
    /// Files in the source tree
    pub total: u64,
    /// Most recently touched item
    pub current_item: String,
    /// Overall percent, 0..=100
    pub percent: u8,
    /// Current phase
    pub phase: ReplicationPhase,
    /// Smoothed throughput in MB/s
    pub throughput_mbps: f64,
    /// Wall-clock time of the update
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A single item that could not be replicated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FailureRecord {
    /// File or directory name
    pub item: String,
    /// Raw reason as reported by the copy
    pub reason: String,
}

impl FailureRecord {
    /// Create a new failure record
    pub fn new<I: Into<String>, R: Into<String>>(item: I, reason: R) -> Self {
        Self {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReplicationStatus {
    /// Everything copied, no failures
    Success,
    /// Copied with some per-item failures
    PartialSuccess,
    /// Nothing copied, or the copy command did not exit cleanly
    Failed,
    /// Stopped on request; already-copied files stay in place
    Cancelled,
}

impl ReplicationStatus {
    /// Whether the run counts as successful
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial-success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Terminal outcome of a run, returned once
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicationResult {
    /// Run identifier
    pub run_id: RunId,
    /// Mode used for the whole run
    pub mode: PrivilegeMode,
    /// Terminal status
    pub status: ReplicationStatus,
    /// Files in the source tree
    pub total_files: u64,
    /// Files reported copied
    pub processed_count: u64,
    /// Files whose destination size matched
    pub verified_count: u64,
    /// Bytes moved; estimated from task sizes in privileged modes
    pub bytes_copied: u64,
    /// De-duplicated per-item failures
    pub failures: Vec<FailureRecord>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ReplicationResult {
    /// Whether the run counts as successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Names of the failed items
    pub fn failed_items(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.item.as_str()).collect()
    }
}

/// Last stored state of a run at the job status boundary
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JobStatus {
    /// Latest throttled progress update
    pub last_update: Option<ProgressUpdate>,
    /// Terminal result, once the run finished
    pub result: Option<ReplicationResult>,
}

/// How a channel proves it is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// The channel must run commands as uid 0
    Root,
    /// The channel must simply answer
    Liveness,
}

/// Collected output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Stream a command line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// One line of streamed command output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Originating stream
    pub stream: OutputStream,
    /// Line text without the trailing newline
    pub text: String,
}

impl OutputLine {
    /// Line read from stdout
    pub fn stdout<S: Into<String>>(text: S) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    /// Line read from stderr
    pub fn stderr<S: Into<String>>(text: S) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}
