//! Integration tests for FerroRep
//!
//! These tests drive the engine end to end against real temporary trees, in
//! unprivileged mode and through a shell-backed privileged channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use ferrorep_engine::{ChannelSet, JsonFileStatusStore, ReplicationEngine, RunControl};
use ferrorep_tests::test_utils::{
    config_with_destination, create_source_tree, tree_sizes, CommonFileSizes, RecordingSink,
    ScriptedChannel,
};
use ferrorep_types::{
    ErrorKind, JobStatusStore, PartitionLimits, PrivilegeMode, ReplicationPhase,
    ReplicationRequest, ReplicationStatus, RunId,
};

const IDENTITY: &str = "com.example.app";

fn privileged_engine(dst: &TempDir, channel: ScriptedChannel) -> ReplicationEngine {
    ReplicationEngine::new(
        config_with_destination(dst.path()),
        ChannelSet::default().with_root(Arc::new(channel)),
    )
}

fn unprivileged_engine(dst: &TempDir) -> ReplicationEngine {
    ReplicationEngine::new(
        config_with_destination(dst.path()),
        ChannelSet::unprivileged_only(),
    )
}

#[tokio::test]
async fn test_three_file_tree_replicates_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let sub_root = create_source_tree(
        src.path(),
        IDENTITY,
        &[
            ("small.txt", CommonFileSizes::TINY),
            ("files/medium.bin", CommonFileSizes::MEDIUM),
            ("files/large.bin", CommonFileSizes::HUGE),
        ],
    );

    let result = privileged_engine(&dst, ScriptedChannel::new())
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.mode, PrivilegeMode::RootBatch);
    assert_eq!(result.status, ReplicationStatus::Success);
    assert_eq!(result.total_files, 3);
    assert_eq!(result.processed_count, 3);
    assert_eq!(result.verified_count, 3);
    assert!(result.failures.is_empty());
    assert_eq!(tree_sizes(&dst.path().join(IDENTITY)), tree_sizes(&sub_root));
    Ok(())
}

#[tokio::test]
async fn test_unprivileged_three_file_tree() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let sub_root = create_source_tree(
        src.path(),
        IDENTITY,
        &[
            ("small.txt", CommonFileSizes::TINY),
            ("files/medium.bin", CommonFileSizes::MEDIUM),
            ("files/large.bin", CommonFileSizes::HUGE),
        ],
    );

    let result = unprivileged_engine(&dst)
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.mode, PrivilegeMode::UnprivilegedConcurrent);
    assert_eq!(result.status, ReplicationStatus::Success);
    assert_eq!(result.processed_count, 3);
    assert_eq!(result.verified_count, 3);
    assert_eq!(result.bytes_copied, CommonFileSizes::TINY + CommonFileSizes::MEDIUM + CommonFileSizes::HUGE);
    assert_eq!(tree_sizes(&dst.path().join(IDENTITY)), tree_sizes(&sub_root));
    Ok(())
}

#[tokio::test]
async fn test_permission_denied_is_partial_success() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    create_source_tree(
        src.path(),
        IDENTITY,
        &[("a.txt", 10), ("secret.db", 64), ("c.txt", 30)],
    );
    let sink = Arc::new(RecordingSink::new());
    let engine = ReplicationEngine::builder()
        .config(config_with_destination(dst.path()))
        .channels(ChannelSet::default().with_root(Arc::new(ScriptedChannel::new().deny("secret.db"))))
        .sink(sink.clone())
        .build();

    let result = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.status, ReplicationStatus::PartialSuccess);
    assert_eq!(result.total_files, 3);
    assert_eq!(result.processed_count, 2);
    assert_eq!(result.verified_count, 2);
    assert_eq!(result.failed_items(), vec!["secret.db"]);
    assert!(result.failures[0].reason.contains("Permission denied"));
    assert!(sink.failures().iter().any(|f| f.item == "secret.db"));
    assert!(!dst.path().join(IDENTITY).join("secret.db").exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_subtree_fails_without_side_effects() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let channel = ScriptedChannel::new();
    let sink = Arc::new(RecordingSink::new());
    let engine = ReplicationEngine::builder()
        .config(config_with_destination(dst.path()))
        .channels(ChannelSet::default().with_root(Arc::new(channel.clone())))
        .sink(sink.clone())
        .build();

    let error = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Setup);
    assert!(channel.commands().is_empty());
    assert!(std::fs::read_dir(dst.path())?.next().is_none());
    assert!(engine.active_runs().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_nested_tree_with_bulk_directories() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let sub_root = create_source_tree(
        src.path(),
        IDENTITY,
        &[
            ("top.txt", 5),
            ("a/one.txt", 11),
            ("a/b/two.txt", 22),
            ("a/b/c/three.txt", 33),
            ("a/b/c/d/four.txt", 44),
            ("wide/0.txt", 1),
            ("wide/1.txt", 2),
            ("wide/2.txt", 3),
        ],
    );
    std::fs::create_dir_all(sub_root.join("a/b/empty"))?;

    let channel = ScriptedChannel::new();
    let mut config = config_with_destination(dst.path());
    config.partition = PartitionLimits::new(1, 2)?;
    let engine = ReplicationEngine::new(
        config,
        ChannelSet::default().with_root(Arc::new(channel.clone())),
    );

    let result = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.status, ReplicationStatus::Success);
    assert_eq!(result.total_files, 8);
    assert_eq!(result.processed_count, 8);
    assert_eq!(result.verified_count, 8);
    assert_eq!(tree_sizes(&dst.path().join(IDENTITY)), tree_sizes(&sub_root));
    assert!(dst.path().join(IDENTITY).join("a/b/empty").is_dir());
    assert!(channel.commands().iter().any(|c| c.contains("cp -rfv")));
    Ok(())
}

#[tokio::test]
async fn test_silent_channel_is_reconciled_by_recount() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let sub_root = create_source_tree(
        src.path(),
        IDENTITY,
        &[("a.txt", 10), ("b/c.txt", 20), ("b/d.txt", 30)],
    );
    let channel = ScriptedChannel::new().silent();

    let result = privileged_engine(&dst, channel.clone())
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.status, ReplicationStatus::Success);
    assert_eq!(result.processed_count, 3);
    assert_eq!(result.verified_count, 3);
    assert!(channel.commands().iter().any(|c| c.starts_with("find ")));
    assert_eq!(tree_sizes(&dst.path().join(IDENTITY)), tree_sizes(&sub_root));
    Ok(())
}

#[tokio::test]
async fn test_replication_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let sub_root = create_source_tree(
        src.path(),
        IDENTITY,
        &[("a.txt", 100), ("x/y/z.txt", 200)],
    );
    let engine = privileged_engine(&dst, ScriptedChannel::new());
    let request = ReplicationRequest::new(src.path(), IDENTITY);

    let first = engine.replicate(request.clone()).await?;
    let after_first = tree_sizes(&dst.path().join(IDENTITY));
    let second = engine.replicate(request.incremental(true)).await?;

    assert_eq!(first.status, ReplicationStatus::Success);
    assert_eq!(second.status, ReplicationStatus::Success);
    assert_eq!(second.processed_count, 2);
    assert_eq!(tree_sizes(&dst.path().join(IDENTITY)), after_first);
    assert_eq!(after_first, tree_sizes(&sub_root));
    Ok(())
}

#[tokio::test]
async fn test_unprivileged_incremental_rerun() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    create_source_tree(src.path(), IDENTITY, &[("a.txt", 100), ("b/c.txt", 200)]);
    let engine = unprivileged_engine(&dst);
    let request = ReplicationRequest::new(src.path(), IDENTITY).incremental(true);

    let first = engine.replicate(request.clone()).await?;
    let second = engine.replicate(request).await?;

    assert_eq!(first.bytes_copied, 300);
    assert_eq!(second.status, ReplicationStatus::Success);
    assert_eq!(second.processed_count, 2);
    assert_eq!(second.bytes_copied, 0);
    Ok(())
}

#[tokio::test]
async fn test_pause_holds_copying_until_resume() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    create_source_tree(src.path(), IDENTITY, &[("a.txt", 10), ("b.txt", 20)]);
    let engine = unprivileged_engine(&dst);
    let control = RunControl::new();
    control.pause();

    let handle = engine
        .start_with_control(RunId::new(), ReplicationRequest::new(src.path(), IDENTITY), control)
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(handle.is_paused());
    assert_eq!(handle.progress().processed, 0);
    assert!(tree_sizes(&dst.path().join(IDENTITY)).is_empty());

    handle.resume();
    let result = handle.wait().await?;
    assert_eq!(result.status, ReplicationStatus::Success);
    assert_eq!(result.processed_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_cancel_while_paused_stops_the_run() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    create_source_tree(src.path(), IDENTITY, &[("a.txt", 10), ("b.txt", 20)]);
    let channel = ScriptedChannel::new();
    let engine = privileged_engine(&dst, channel.clone());
    let control = RunControl::new();
    control.pause();
    let run_id = RunId::new();

    let handle = engine
        .start_with_control(run_id, ReplicationRequest::new(src.path(), IDENTITY), control)
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.cancel(run_id).await?;

    let result = handle.wait().await?;
    assert_eq!(result.status, ReplicationStatus::Cancelled);
    assert_eq!(result.processed_count, 0);
    assert_eq!(result.verified_count, 0);
    assert!(!channel.commands().iter().any(|c| c.contains("cp -")));
    assert!(engine.active_runs().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_progress_counts_stay_ordered() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let files: Vec<(String, u64)> = (0..40)
        .map(|i| (format!("d{}/f{}.txt", i % 4, i), 10 + i as u64))
        .collect();
    let files: Vec<(&str, u64)> = files.iter().map(|(p, s)| (p.as_str(), *s)).collect();
    create_source_tree(src.path(), IDENTITY, &files);

    let sink = Arc::new(RecordingSink::new());
    let engine = ReplicationEngine::builder()
        .config(config_with_destination(dst.path()))
        .channels(ChannelSet::default().with_root(Arc::new(ScriptedChannel::new())))
        .sink(sink.clone())
        .build();

    let result = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    assert_eq!(result.status, ReplicationStatus::Success);
    assert!(result.verified_count <= result.processed_count);
    assert!(result.processed_count <= result.total_files);

    let updates = sink.updates();
    assert!(!updates.is_empty());
    for update in &updates {
        assert!(update.processed <= update.total || update.total == 0);
        assert!(update.percent <= 100);
    }
    for pair in updates.windows(2) {
        assert!(pair[0].percent <= pair[1].percent);
    }
    let last = updates.last().map(|u| (u.phase, u.percent));
    assert_eq!(last, Some((ReplicationPhase::Completed, 100)));
    assert_eq!(sink.completion_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_brokered_mode_when_only_broker_answers() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    create_source_tree(src.path(), IDENTITY, &[("a.txt", 10)]);
    let engine = ReplicationEngine::new(
        config_with_destination(dst.path()),
        ChannelSet::default().with_brokered(Arc::new(ScriptedChannel::new())),
    );

    assert_eq!(engine.selected_mode().await?, PrivilegeMode::BrokeredBatch);
    let result = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;
    assert_eq!(result.mode, PrivilegeMode::BrokeredBatch);
    assert_eq!(result.status, ReplicationStatus::Success);
    Ok(())
}

#[tokio::test]
async fn test_status_is_persisted_per_run() -> Result<(), Box<dyn std::error::Error>> {
    let src = TempDir::new()?;
    let dst = TempDir::new()?;
    let status_dir = TempDir::new()?;
    create_source_tree(src.path(), IDENTITY, &[("a.txt", 10), ("b.txt", 20)]);
    let engine = ReplicationEngine::builder()
        .config(config_with_destination(dst.path()))
        .status_store(Arc::new(JsonFileStatusStore::new(status_dir.path())))
        .build();

    let result = engine
        .replicate(ReplicationRequest::new(src.path(), IDENTITY))
        .await?;

    let reloaded = JsonFileStatusStore::new(status_dir.path());
    let status = reloaded.load(result.run_id).await?.expect("status was stored");
    assert_eq!(status.result.as_ref().map(|r| r.status), Some(ReplicationStatus::Success));
    assert_eq!(status.last_update.map(|u| u.percent), Some(100));
    assert!(reloaded.load(RunId::new()).await?.is_none());
    let expected: PathBuf = status_dir.path().join(format!("{}.json", result.run_id));
    assert_eq!(reloaded.path_for(result.run_id), expected);
    Ok(())
}
