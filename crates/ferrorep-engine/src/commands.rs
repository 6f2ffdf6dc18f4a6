//! Shell command lines sent through privileged channels

use ferrorep_channel::shell_quote;
use ferrorep_types::{CopyTask, ManifestEntry};
use std::path::Path;

fn source_arg(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Parent directory of a `/`-separated destination path
pub fn parent_of(target: &str) -> &str {
    match target.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => "/",
    }
}

/// Copy a whole subtree: `mkdir -p T && cp -rfv S/. T/`
pub fn bulk_copy(source: &Path, target: &str, incremental: bool) -> String {
    let flags = if incremental { "-rfvu" } else { "-rfv" };
    let t = shell_quote(target.trim_end_matches('/'));
    let s = shell_quote(source.to_string_lossy().trim_end_matches('/'));
    format!("mkdir -p {t} && cp {flags} {s}/. {t}/")
}

/// Copy one file after creating its parent
pub fn file_copy(source: &Path, target: &str, incremental: bool) -> String {
    let flags = if incremental { "-fvu" } else { "-fv" };
    format!(
        "mkdir -p {} && cp {} {} {}",
        shell_quote(parent_of(target)),
        flags,
        source_arg(source),
        shell_quote(target)
    )
}

/// Command for one task
pub fn copy_task(task: &CopyTask, incremental: bool) -> String {
    if task.is_directory_bulk {
        bulk_copy(&task.source_entry, &task.target_path, incremental)
    } else {
        file_copy(&task.source_entry, &task.target_path, incremental)
    }
}

/// Count regular files under a destination
pub fn recount(target: &str) -> String {
    format!("find {} -type f | wc -l", shell_quote(target))
}

/// Create a directory and its parents
pub fn ensure_dir(target: &str) -> String {
    format!("mkdir -p {}", shell_quote(target))
}

/// Print `size path` for each manifest target, each record NUL-terminated
pub fn stat_batch(entries: &[ManifestEntry]) -> String {
    let mut command = String::from("stat --printf '%s %n\\0' --");
    for entry in entries {
        command.push(' ');
        command.push_str(&shell_quote(&entry.target));
    }
    command
}
