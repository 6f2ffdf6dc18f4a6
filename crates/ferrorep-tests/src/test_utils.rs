//! Unified test utilities for FerroRep tests and benchmarks

use async_trait::async_trait;
use ferrorep_channel::{shell_quote, ShellChannel};
use ferrorep_config::Config;
use ferrorep_types::{
    CommandChannel, CommandOutput, CommandStream, FailureRecord, ProbeKind, ProgressSink,
    ProgressUpdate, ReplicationResult, Result, RunId,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Common file sizes for replication scenarios
pub struct CommonFileSizes;

impl CommonFileSizes {
    pub const TINY: u64 = 10; // 10B
    pub const MEDIUM: u64 = 2 * 1024 * 1024; // 2MB
    pub const HUGE: u64 = 150 * 1024 * 1024; // 150MB
}

/// Files at or above this size are created sparse
const SPARSE_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Create `<root>/<identity>/<path>` for every `(path, size)` pair
///
/// Returns the sub-root. Small files get deterministic content; large files
/// are sparse so scenarios with hundreds of megabytes stay cheap.
pub fn create_source_tree(root: &Path, identity: &str, files: &[(&str, u64)]) -> PathBuf {
    let sub_root = root.join(identity);
    fs::create_dir_all(&sub_root).expect("Failed to create sub-root");
    for (relative, size) in files {
        let path = sub_root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        if *size >= SPARSE_THRESHOLD {
            let file = fs::File::create(&path).expect("Failed to create test file");
            file.set_len(*size).expect("Failed to size test file");
        } else {
            let data: Vec<u8> = (0..*size).map(|i| ((i * 7 + 13) % 256) as u8).collect();
            fs::write(&path, data).expect("Failed to write test file");
        }
    }
    sub_root
}

/// Default configuration whose destination template lives under `dest`
pub fn config_with_destination(dest: &Path) -> Config {
    let mut config = Config::default();
    config.layout.destination_template = format!("{}/{{id}}", dest.display());
    config
}

/// Relative path and size of every regular file below `root`, sorted
pub fn tree_sizes(root: &Path) -> Vec<(PathBuf, u64)> {
    let mut sizes: Vec<(PathBuf, u64)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir entries live under the root")
                .to_path_buf();
            let size = entry.metadata().expect("Failed to stat entry").len();
            (relative, size)
        })
        .collect();
    sizes.sort();
    sizes
}

/// Progress sink that keeps everything it is told
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
    failures: Mutex<Vec<FailureRecord>>,
    completions: Mutex<Vec<ReplicationResult>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Every progress update in arrival order
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every per-item failure in arrival order
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completion callbacks received
    pub fn completion_count(&self) -> usize {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ProgressSink for RecordingSink {
    fn report_progress(&self, update: &ProgressUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
    }

    fn report_failure(&self, _run_id: RunId, failure: &FailureRecord) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure.clone());
    }

    fn report_completion(&self, result: &ReplicationResult) {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}

/// A privileged channel backed by the local `sh`
///
/// Passes every probe so the engine selects a privileged mode, then runs the
/// real commands with the caller's own rights. Copy commands that mention a
/// denied name fail the way `cp` does without permission, and silent mode
/// drops `-v` so no per-file lines are printed.
#[derive(Debug, Clone)]
pub struct ScriptedChannel {
    shell: ShellChannel,
    denied: Vec<String>,
    silent: bool,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    /// Channel that runs everything unchanged
    pub fn new() -> Self {
        Self {
            shell: ShellChannel::local(),
            denied: Vec::new(),
            silent: false,
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail any copy command naming `name`
    pub fn deny<S: Into<String>>(mut self, name: S) -> Self {
        self.denied.push(name.into());
        self
    }

    /// Strip the verbose flag from copy commands
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Commands received so far, before rewriting
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rewrite(&self, command: &str) -> String {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());

        let is_copy = command.contains("cp -");
        if is_copy {
            if let Some(name) = self.denied.iter().find(|name| command.contains(name.as_str())) {
                let message = format!("cp: cannot open '{name}' for reading: Permission denied");
                return format!("echo {} >&2; exit 1", shell_quote(&message));
            }
            if self.silent {
                return command
                    .replacen("cp -rfv", "cp -rf", 1)
                    .replacen("cp -fv", "cp -f", 1);
            }
        }
        command.to_string()
    }
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute_with_output(&self, command: &str) -> Result<CommandOutput> {
        self.shell.execute_with_output(&self.rewrite(command)).await
    }

    async fn execute_streaming(&self, command: &str) -> Result<CommandStream> {
        self.shell.execute_streaming(&self.rewrite(command)).await
    }

    async fn probe(&self, _kind: ProbeKind) -> bool {
        true
    }
}
