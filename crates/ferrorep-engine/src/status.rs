//! Job status stores
//!
//! The store outlives the process that ran the job: a restarted CLI or UI can
//! look a run up by its identifier and see the last throttled update and, once
//! finished, the terminal result.

use async_trait::async_trait;
use ferrorep_types::{Error, JobStatus, JobStatusStore, ProgressUpdate, ReplicationResult, Result, RunId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// One `<run_id>.json` file per run in a directory
#[derive(Debug)]
pub struct JsonFileStatusStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStatusStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the status files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the status file of a run
    pub fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    async fn read(&self, run_id: RunId) -> Result<Option<JobStatus>> {
        let path = self.path_for(run_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                Error::io(format!("corrupt status file '{}': {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temporary file and rename so readers never see a torn file
    async fn write(&self, run_id: RunId, status: &JobStatus) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(run_id);
        let tmp = self.dir.join(format!(".{run_id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(status)
            .map_err(|e| Error::other(format!("failed to encode job status: {}", e)))?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(run_id = %run_id, "job status written to {}", path.display());
        Ok(())
    }

    async fn update<F>(&self, run_id: RunId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut JobStatus) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut status = self.read(run_id).await?.unwrap_or_default();
        apply(&mut status);
        self.write(run_id, &status).await
    }
}

#[async_trait]
impl JobStatusStore for JsonFileStatusStore {
    async fn publish(&self, update: &ProgressUpdate) -> Result<()> {
        let update = update.clone();
        self.update(update.run_id, move |status| status.last_update = Some(update))
            .await
    }

    async fn publish_result(&self, result: &ReplicationResult) -> Result<()> {
        let result = result.clone();
        self.update(result.run_id, move |status| status.result = Some(result))
            .await
    }

    async fn load(&self, run_id: RunId) -> Result<Option<JobStatus>> {
        self.read(run_id).await
    }
}

/// In-process store, mainly for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<RunId, JobStatus>>,
    publishes: AtomicUsize,
}

impl MemoryStatusStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of progress updates accepted so far
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JobStatusStore for MemoryStatusStore {
    async fn publish(&self, update: &ProgressUpdate) -> Result<()> {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.statuses
            .write()
            .await
            .entry(update.run_id)
            .or_default()
            .last_update = Some(update.clone());
        Ok(())
    }

    async fn publish_result(&self, result: &ReplicationResult) -> Result<()> {
        self.statuses
            .write()
            .await
            .entry(result.run_id)
            .or_default()
            .result = Some(result.clone());
        Ok(())
    }

    async fn load(&self, run_id: RunId) -> Result<Option<JobStatus>> {
        Ok(self.statuses.read().await.get(&run_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrorep_types::{PrivilegeMode, ReplicationPhase, ReplicationStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    fn update(run_id: RunId, processed: u64) -> ProgressUpdate {
        ProgressUpdate {
            run_id,
            mode: PrivilegeMode::RootBatch,
            processed,
            total: 3,
            current_item: "a.txt".to_string(),
            percent: 30,
            phase: ReplicationPhase::Replacing,
            throughput_mbps: 1.5,
            timestamp: chrono::Utc::now(),
        }
    }

    fn result(run_id: RunId) -> ReplicationResult {
        ReplicationResult {
            run_id,
            mode: PrivilegeMode::RootBatch,
            status: ReplicationStatus::Success,
            total_files: 3,
            processed_count: 3,
            verified_count: 3,
            bytes_copied: 0,
            failures: Vec::new(),
            elapsed: Duration::from_millis(1200),
        }
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStatusStore::new(dir.path().join("status"));
        let run_id = RunId::new();

        assert!(store.load(run_id).await.unwrap().is_none());

        store.publish(&update(run_id, 1)).await.unwrap();
        store.publish(&update(run_id, 2)).await.unwrap();
        store.publish_result(&result(run_id)).await.unwrap();

        let status = store.load(run_id).await.unwrap().unwrap();
        assert_eq!(status.last_update.unwrap().processed, 2);
        assert_eq!(status.result.unwrap().status, ReplicationStatus::Success);
        assert!(store.path_for(run_id).exists());
    }

    #[tokio::test]
    async fn test_json_store_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        let run_id = RunId::new();
        JsonFileStatusStore::new(dir.path())
            .publish(&update(run_id, 2))
            .await
            .unwrap();

        let reopened = JsonFileStatusStore::new(dir.path());
        let status = reopened.load(run_id).await.unwrap().unwrap();
        assert_eq!(status.last_update.unwrap().current_item, "a.txt");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStatusStore::new(dir.path());
        let run_id = RunId::new();
        std::fs::write(store.path_for(run_id), b"{not json").unwrap();
        let error = store.load(run_id).await.unwrap_err();
        assert_eq!(error.kind(), ferrorep_types::ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStatusStore::new();
        let run_id = RunId::new();
        store.publish(&update(run_id, 1)).await.unwrap();
        store.publish_result(&result(run_id)).await.unwrap();

        let status = store.load(run_id).await.unwrap().unwrap();
        assert_eq!(status.last_update.unwrap().processed, 1);
        assert!(status.result.is_some());
        assert_eq!(store.publish_count(), 1);
        assert!(store.load(RunId::new()).await.unwrap().is_none());
    }
}
