//! JSON output structures for FerroRep CLI

use ferrorep_types::{PrivilegeMode, ProbeSignals, ReplicationRequest, ReplicationResult};
use serde::{Deserialize, Serialize};

/// Complete JSON output for a replication run
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicationResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Terminal result as produced by the engine
    pub result: ReplicationResult,
    /// Names of the items that failed, deduplicated
    pub failed_items: Vec<String>,
    /// Average transfer rate over the whole run
    pub average_rate_mbps: f64,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// FerroRep version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp when the output was produced
    pub timestamp: String,
    /// Source root
    pub source_root: String,
    /// Destination identity
    pub destination_identity: String,
    /// Resolved destination root
    pub destination_root: String,
}

impl ReplicationResultJson {
    /// Wrap an engine result for printing
    pub fn new(request: &ReplicationRequest, destination_root: &str, result: ReplicationResult) -> Self {
        let secs = result.elapsed.as_secs_f64();
        let average_rate_mbps = if secs > 0.0 {
            result.bytes_copied as f64 / secs / 1024.0 / 1024.0
        } else {
            0.0
        };
        let failed_items = result
            .failed_items()
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                operation: "replicate".to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                source_root: request.source_root.display().to_string(),
                destination_identity: request.destination_identity.clone(),
                destination_root: destination_root.to_string(),
            },
            result,
            failed_items,
            average_rate_mbps,
        }
    }
}

/// JSON output of the probe command
#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeJson {
    /// Root shell answered as uid 0
    pub root_available: bool,
    /// Privileged broker answered
    pub brokered_available: bool,
    /// Mode a run would use, if one can be selected
    pub selected_mode: Option<PrivilegeMode>,
    /// Why no mode could be selected
    pub error: Option<String>,
}

impl ProbeJson {
    /// Build from probe signals and the selection outcome
    pub fn new(signals: ProbeSignals, mode: Result<PrivilegeMode, String>) -> Self {
        let (selected_mode, error) = match mode {
            Ok(mode) => (Some(mode), None),
            Err(reason) => (None, Some(reason)),
        };
        Self {
            root_available: signals.root_available,
            brokered_available: signals.brokered_available,
            selected_mode,
            error,
        }
    }
}
