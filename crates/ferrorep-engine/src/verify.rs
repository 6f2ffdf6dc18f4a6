//! Post-copy size verification
//!
//! Reuses the partition manifest, so the source tree is never walked twice.
//! Mismatches are reported but never fail the run.

use crate::commands;
use crate::context::RunContext;
use crate::control::Checkpoint;
use ferrorep_types::{ErrorContext, ManifestEntry, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

const VERIFY_BAND_START: u64 = 90;
const VERIFY_BAND_WIDTH: u64 = 10;

/// A destination file whose size does not match its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Destination path
    pub target: String,
    /// Source size
    pub expected: u64,
    /// Destination size, `None` when missing
    pub actual: Option<u64>,
}

/// Outcome of verifying a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Entries looked at
    pub checked: u64,
    /// Entries whose destination size matched
    pub verified: u64,
    /// Entries that did not match
    pub mismatches: Vec<Mismatch>,
}

/// Parse NUL-terminated `size path` records into target sizes
fn parse_stat_output(stdout: &str) -> HashMap<&str, u64> {
    stdout
        .split('\0')
        .filter_map(|record| {
            let (size, path) = record.split_once(' ')?;
            Some((path, size.trim().parse().ok()?))
        })
        .collect()
}

async fn privileged_sizes(ctx: &RunContext, batch: &[ManifestEntry]) -> Result<Vec<Option<u64>>> {
    let output = ctx
        .channel()?
        .execute_with_output(&commands::stat_batch(batch))
        .await?;
    let sizes = parse_stat_output(&output.stdout);
    Ok(batch
        .iter()
        .map(|entry| sizes.get(entry.target.as_str()).copied())
        .collect())
}

async fn local_sizes(batch: &[ManifestEntry]) -> Vec<Option<u64>> {
    let mut sizes = Vec::with_capacity(batch.len());
    for entry in batch {
        sizes.push(
            tokio::fs::symlink_metadata(&entry.target)
                .await
                .ok()
                .map(|m| m.len()),
        );
    }
    sizes
}

/// Compare every manifest entry against its destination
///
/// Stops early, keeping what was checked so far, when the run is cancelled.
pub async fn verify(ctx: &RunContext, manifest: &[ManifestEntry]) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    let total = manifest.len() as u64;
    let batch_size = ctx.config.verification.batch_size.get();

    for (index, batch) in manifest.chunks(batch_size).enumerate() {
        if ctx.control.checkpoint().await == Checkpoint::Cancelled {
            debug!(run_id = %ctx.run_id, "verification stopped by cancel");
            break;
        }

        let sizes = if ctx.mode.is_privileged() {
            privileged_sizes(ctx, batch).await.map_err(|e| {
                let context = ErrorContext::new("verify")
                    .with_detail("batch", index.to_string())
                    .with_detail("mode", ctx.mode.label());
                e.with_context(&context)
            })?
        } else {
            local_sizes(batch).await
        };

        for (entry, actual) in batch.iter().zip(sizes) {
            report.checked += 1;
            if actual == Some(entry.size) {
                report.verified += 1;
            } else {
                warn!(
                    run_id = %ctx.run_id,
                    target = %entry.target,
                    expected = entry.size,
                    ?actual,
                    "verification mismatch"
                );
                report.mismatches.push(Mismatch {
                    target: entry.target.clone(),
                    expected: entry.size,
                    actual,
                });
            }
        }

        if let Some(last) = batch.last() {
            ctx.tracker.set_current_item(
                last.target.rsplit('/').next().unwrap_or(&last.target).to_string(),
            );
        }
        let percent = VERIFY_BAND_START + VERIFY_BAND_WIDTH * report.checked / total.max(1);
        ctx.tracker.raise_percent(percent as u8);
        ctx.reporter.emit().await;
    }

    debug!(
        run_id = %ctx.run_id,
        checked = report.checked,
        verified = report.verified,
        mismatches = report.mismatches.len(),
        "verification finished"
    );
    Ok(report)
}
