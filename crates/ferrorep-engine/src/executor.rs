//! Concurrent copy execution
//!
//! Privileged runs send one shell command per task through the bound channel
//! and count progress from its verbose output. Unprivileged runs copy file by
//! file in-process. Both are bounded by a per-mode semaphore and pass through
//! a pause/cancel checkpoint before every unit of work.

use crate::commands;
use crate::context::RunContext;
use crate::control::Checkpoint;
use crate::parser::LineOutcome;
use crate::partition::Partition;
use ferrorep_types::{CopyTask, Error, FailureRecord, ManifestEntry, Result};
use filetime::FileTime;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// How the copy phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Every task exited cleanly or explained its failure per item
    pub exit_clean: bool,
    /// The run was cancelled before all tasks ran
    pub cancelled: bool,
}

/// Runs a partition's tasks under the run's mode and concurrency bound
#[derive(Debug, Clone)]
pub struct CopyExecutor {
    ctx: Arc<RunContext>,
}

fn item_name(target: &str) -> String {
    let trimmed = target.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn absorb(
    joined: std::result::Result<Result<bool>, JoinError>,
    clean: &mut bool,
    failure: &mut Option<Error>,
) {
    match joined {
        Ok(Ok(task_clean)) => *clean &= task_clean,
        Ok(Err(e)) => {
            error!("copy task aborted: {}", e);
            failure.get_or_insert(e);
        }
        Err(e) => {
            error!("copy task panicked: {}", e);
            failure.get_or_insert_with(|| Error::other(format!("copy task failed: {}", e)));
        }
    }
}

impl CopyExecutor {
    /// Create an executor for one run
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Run every task and report whether the run stayed clean
    ///
    /// Channel failures abort the run with an error once in-flight tasks have
    /// finished. Cancellation stops launching tasks but lets running ones end.
    pub async fn execute(&self, partition: Arc<Partition>) -> Result<ExecutionOutcome> {
        let ctx = &self.ctx;
        let mut exit_clean = self.ensure_destination_root().await?;

        let workers = ctx.config.concurrency.workers_for(ctx.mode);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut failure = None;
        debug!(
            run_id = %ctx.run_id,
            workers,
            tasks = partition.tasks.len(),
            "launching copy tasks"
        );

        for index in 0..partition.tasks.len() {
            while let Some(joined) = tasks.try_join_next() {
                absorb(joined, &mut exit_clean, &mut failure);
            }
            if failure.is_some() {
                break;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::other(format!("failed to acquire worker permit: {}", e)))?;
            // pause or cancel may have arrived while every worker was busy
            if ctx.control.checkpoint().await == Checkpoint::Cancelled {
                break;
            }
            let ctx = Arc::clone(ctx);
            let partition = Arc::clone(&partition);
            tasks.spawn(async move {
                let _permit = permit;
                run_task(&ctx, &partition, index).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            absorb(joined, &mut exit_clean, &mut failure);
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let cancelled = ctx.control.is_cancelled();
        if !cancelled
            && exit_clean
            && ctx.tracker.processed() == 0
            && ctx.tracker.total() > 0
            && ctx.tracker.errors() == 0
        {
            self.reconcile().await?;
        }

        Ok(ExecutionOutcome {
            exit_clean,
            cancelled,
        })
    }

    async fn ensure_destination_root(&self) -> Result<bool> {
        let ctx = &self.ctx;
        let root = &ctx.destination_root;
        let outcome = if ctx.mode.is_privileged() {
            let output = ctx
                .channel()?
                .execute_with_output(&commands::ensure_dir(root))
                .await?;
            if output.success() {
                Ok(())
            } else {
                let reason = output.stderr.trim();
                Err(if reason.is_empty() {
                    format!("mkdir exited with status {}", output.exit_code)
                } else {
                    reason.to_string()
                })
            }
        } else {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| e.to_string())
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(reason) => {
                ctx.record_failure(FailureRecord::new(item_name(root), reason));
                Ok(false)
            }
        }
    }

    /// Replace a zero success count with a recount of the destination
    async fn reconcile(&self) -> Result<()> {
        let ctx = &self.ctx;
        let recount = if ctx.mode.is_privileged() {
            let output = ctx
                .channel()?
                .execute_with_output(&commands::recount(&ctx.destination_root))
                .await?;
            match output.stdout.trim().parse::<u64>() {
                Ok(count) if output.success() => count,
                _ => {
                    warn!(
                        run_id = %ctx.run_id,
                        "destination recount returned unusable output: {:?}",
                        output.stdout.trim()
                    );
                    return Ok(());
                }
            }
        } else {
            let root = ctx.destination_root.clone();
            tokio::task::spawn_blocking(move || {
                WalkDir::new(root)
                    .into_iter()
                    .filter_map(std::result::Result::ok)
                    .filter(|entry| entry.file_type().is_file())
                    .count() as u64
            })
            .await
            .map_err(|e| Error::other(format!("recount task failed: {}", e)))?
        };

        let processed = recount.min(ctx.tracker.total());
        info!(
            run_id = %ctx.run_id,
            recount,
            processed,
            "copy output reported nothing, using destination recount"
        );
        ctx.tracker.set_processed(processed);
        ctx.reporter.advance_copy().await;
        Ok(())
    }
}

async fn run_task(ctx: &RunContext, partition: &Partition, index: usize) -> Result<bool> {
    let Some(task) = partition.tasks.get(index) else {
        return Ok(true);
    };
    if ctx.control.checkpoint().await == Checkpoint::Cancelled {
        return Ok(true);
    }
    ctx.tracker.set_current_item(task.display_name());
    if ctx.mode.is_privileged() {
        run_privileged(ctx, task, partition.files_of(index)).await
    } else {
        run_unprivileged(ctx, task, partition.files_of(index)).await
    }
}

/// Collapse `.` and empty segments so `T/./a//b` and `T/a/b` compare equal
fn normalize_target(path: &str) -> String {
    let joined = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

async fn run_privileged(
    ctx: &RunContext,
    task: &CopyTask,
    files: &[ManifestEntry],
) -> Result<bool> {
    let channel = ctx.channel()?;
    let command = commands::copy_task(task, ctx.request.incremental);
    debug!(run_id = %ctx.run_id, channel = channel.name(), "{}", command);

    // verbose cp also reports every directory it creates; only manifest files count
    let mut pending: HashSet<String> = files
        .iter()
        .map(|entry| normalize_target(&entry.target))
        .collect();
    let mut stream = channel.execute_streaming(&command).await?;
    let mut successes = 0u64;
    let mut errors = 0u64;
    let mut counting = true;

    while let Some(line) = stream.next_line().await {
        if counting && ctx.control.checkpoint().await == Checkpoint::Cancelled {
            counting = false;
        }
        if !counting {
            continue;
        }
        let Some(parsed) = ctx.parser.parse(&line.text) else {
            continue;
        };
        match parsed.outcome {
            LineOutcome::Success => {
                ctx.tracker.set_current_item(parsed.item);
                if pending.remove(&normalize_target(&parsed.path)) {
                    successes += 1;
                    ctx.tracker.add_processed(1);
                    ctx.reporter.advance_copy().await;
                }
            }
            LineOutcome::Error(reason) => {
                errors += 1;
                ctx.record_failure(FailureRecord::new(parsed.item, reason));
            }
        }
    }

    let code = stream.wait().await?;
    if !counting {
        debug!(run_id = %ctx.run_id, "task output drained after cancel");
        return Ok(true);
    }

    let clean = code == 0 || errors > 0;
    if !clean {
        ctx.record_failure(FailureRecord::new(
            task.display_name(),
            format!("copy command exited with status {} without reporting why", code),
        ));
    }

    if clean && ctx.request.incremental {
        let remaining = task
            .file_count
            .saturating_sub(successes)
            .saturating_sub(errors);
        if remaining > 0 {
            ctx.tracker.add_processed(remaining);
            successes += remaining;
            ctx.reporter.advance_copy().await;
        }
    }

    if task.file_count > 0 {
        let estimate =
            u128::from(task.byte_count) * u128::from(successes) / u128::from(task.file_count);
        ctx.tracker.add_bytes(estimate as u64);
    }

    debug!(
        run_id = %ctx.run_id,
        task = %task.display_name(),
        code,
        successes,
        errors,
        "privileged task finished"
    );
    Ok(clean)
}

async fn run_unprivileged(ctx: &RunContext, task: &CopyTask, files: &[ManifestEntry]) -> Result<bool> {
    if task.is_directory_bulk {
        let source = task.source_entry.clone();
        let target = task.target_path.clone();
        let problems = tokio::task::spawn_blocking(move || mirror_directories(&source, &target))
            .await
            .map_err(|e| Error::other(format!("directory creation task failed: {}", e)))?;
        for failure in problems {
            ctx.record_failure(failure);
        }
    }

    for entry in files {
        if ctx.control.checkpoint().await == Checkpoint::Cancelled {
            break;
        }
        let name = item_name(&entry.target);
        ctx.tracker.set_current_item(name.clone());
        match copy_file(ctx, entry).await {
            Ok(bytes) => {
                ctx.tracker.add_processed(1);
                ctx.tracker.add_bytes(bytes);
            }
            Err(e) => ctx.record_failure(FailureRecord::new(name, e.to_string())),
        }
        ctx.reporter.advance_copy().await;
    }
    Ok(true)
}

/// Recreate the directory skeleton of a bulk subtree, empty directories included
fn mirror_directories(source: &Path, target: &str) -> Vec<FailureRecord> {
    let mut problems = Vec::new();
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let item = e
                    .path()
                    .and_then(Path::file_name)
                    .map_or_else(|| item_name(target), |n| n.to_string_lossy().into_owned());
                let reason = e
                    .io_error()
                    .map_or_else(|| e.to_string(), ToString::to_string);
                problems.push(FailureRecord::new(item, reason));
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = Path::new(target).join(relative);
        if let Err(e) = std::fs::create_dir_all(&destination) {
            problems.push(FailureRecord::new(item_name(&destination.to_string_lossy()), e.to_string()));
        }
    }
    problems
}

async fn copy_file(ctx: &RunContext, entry: &ManifestEntry) -> Result<u64> {
    let destination = Path::new(&entry.target);
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let metadata = tokio::fs::symlink_metadata(&entry.source).await?;

    #[cfg(unix)]
    {
        if metadata.file_type().is_symlink() {
            copy_symlink(&entry.source, destination).await?;
            return Ok(0);
        }
    }

    if ctx.request.incremental && is_up_to_date(&metadata, destination).await {
        return Ok(0);
    }

    let outcome = ctx.zerocopy.transfer(&entry.source, destination).await?;
    filetime::set_file_mtime(destination, FileTime::from_last_modification_time(&metadata))?;
    Ok(outcome.bytes)
}

async fn is_up_to_date(source: &std::fs::Metadata, destination: &Path) -> bool {
    match tokio::fs::metadata(destination).await {
        Ok(existing) => {
            existing.len() == source.len()
                && FileTime::from_last_modification_time(&existing)
                    == FileTime::from_last_modification_time(source)
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
async fn copy_symlink(source: &Path, destination: &Path) -> Result<()> {
    let link = tokio::fs::read_link(source).await?;
    if tokio::fs::symlink_metadata(destination).await.is_ok() {
        tokio::fs::remove_file(destination).await?;
    }
    tokio::fs::symlink(link, destination).await?;
    Ok(())
}
