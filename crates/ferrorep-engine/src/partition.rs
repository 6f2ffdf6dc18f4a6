//! Source tree partitioning
//!
//! A single traversal of the sub-root produces both the copy tasks and the
//! file manifest. Shallow, narrow directories are split into per-file tasks so
//! several workers can share them; deep or wide directories become one bulk
//! task each, since one `cp -r` is far cheaper than thousands of invocations.

use ferrorep_types::{CopyTask, Error, ManifestEntry, PartitionLimits, Result};
use std::fs::{self, DirEntry};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Tasks and manifest for one run
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Copy tasks in deterministic order
    pub tasks: Vec<CopyTask>,
    /// Every regular file and symlink found, grouped by task
    pub manifest: Vec<ManifestEntry>,
    /// Number of manifest entries
    pub total_files: u64,
    /// Sum of manifest sizes
    pub total_bytes: u64,
    /// Directories that could not be listed; each still has a bulk task
    pub unreadable: Vec<PathBuf>,
    ranges: Vec<Range<usize>>,
}

impl Partition {
    /// Manifest entries covered by the task at `index`
    pub fn files_of(&self, index: usize) -> &[ManifestEntry] {
        self.ranges
            .get(index)
            .map_or(&[][..], |range| &self.manifest[range.clone()])
    }

    /// Tasks paired with the files they cover
    pub fn iter(&self) -> impl Iterator<Item = (&CopyTask, &[ManifestEntry])> {
        self.tasks
            .iter()
            .enumerate()
            .map(move |(index, task)| (task, self.files_of(index)))
    }

    /// Whether there is nothing to copy
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn push_file(&mut self, source: PathBuf, target: String, size: u64) {
        let start = self.manifest.len();
        self.manifest.push(ManifestEntry {
            source: source.clone(),
            target: target.clone(),
            size,
        });
        self.tasks.push(CopyTask::file(source, target, size));
        self.ranges.push(start..start + 1);
    }

    fn push_bulk(&mut self, source: PathBuf, target: String, files: Vec<ManifestEntry>) {
        let start = self.manifest.len();
        let bytes = files.iter().map(|entry| entry.size).sum();
        let count = files.len() as u64;
        self.manifest.extend(files);
        self.tasks.push(CopyTask::bulk(source, target, count, bytes));
        self.ranges.push(start..self.manifest.len());
    }
}

/// Append one path segment to a `/`-separated destination path
pub(crate) fn join_target(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

fn read_sorted(dir: &Path) -> std::io::Result<Vec<DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(DirEntry::file_name);
    Ok(entries)
}

fn enumerate_subtree(dir: &Path, target: &str) -> Vec<ManifestEntry> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry.metadata().map_or(0, |m| m.len());
        files.push(ManifestEntry {
            source: entry.path().to_path_buf(),
            target: join_target(target, &relative),
            size,
        });
    }
    files
}

fn visit(
    entries: Vec<DirEntry>,
    target: &str,
    depth: usize,
    limits: &PartitionLimits,
    partition: &mut Partition,
) {
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let source = entry.path();
        let child_target = join_target(target, &name);
        let is_dir = entry.file_type().map_or(false, |t| t.is_dir());

        if !is_dir {
            let size = fs::symlink_metadata(&source).map_or(0, |m| m.len());
            partition.push_file(source, child_target, size);
            continue;
        }

        let child_depth = depth + 1;
        match read_sorted(&source) {
            Err(e) => {
                warn!("cannot list {}: {}", source.display(), e);
                partition.unreadable.push(source.clone());
                partition.push_bulk(source, child_target, Vec::new());
            }
            Ok(children) if children.is_empty() => {
                partition.push_bulk(source, child_target, Vec::new());
            }
            Ok(children) if limits.requires_bulk(child_depth, children.len()) => {
                let files = enumerate_subtree(&source, &child_target);
                debug!(
                    files = files.len(),
                    depth = child_depth,
                    fan_out = children.len(),
                    "bulk task for {}",
                    source.display()
                );
                partition.push_bulk(source, child_target, files);
            }
            Ok(children) => visit(children, &child_target, child_depth, limits, partition),
        }
    }
}

/// Split the tree under `sub_root` into copy tasks targeting `destination_root`
///
/// The sub-root itself is always descended, whatever its fan-out.
pub fn partition(
    sub_root: &Path,
    destination_root: &str,
    limits: &PartitionLimits,
) -> Result<Partition> {
    let entries = read_sorted(sub_root).map_err(|e| {
        Error::io(format!("cannot list '{}': {}", sub_root.display(), e))
    })?;

    let mut partition = Partition::default();
    visit(entries, destination_root, 0, limits, &mut partition);
    partition.total_files = partition.manifest.len() as u64;
    partition.total_bytes = partition.manifest.iter().map(|entry| entry.size).sum();

    debug!(
        tasks = partition.tasks.len(),
        files = partition.total_files,
        bytes = partition.total_bytes,
        "partitioned {}",
        sub_root.display()
    );
    Ok(partition)
}

/// [`partition`] on the blocking pool
pub async fn partition_async(
    sub_root: PathBuf,
    destination_root: String,
    limits: PartitionLimits,
) -> Result<Partition> {
    tokio::task::spawn_blocking(move || partition(&sub_root, &destination_root, &limits))
        .await
        .map_err(|e| Error::other(format!("partitioning task failed: {}", e)))?
}
