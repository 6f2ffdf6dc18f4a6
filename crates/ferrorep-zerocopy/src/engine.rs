//! Zero-copy transfer engine
//!
//! Picks the fastest primitive available for a file and falls back to a
//! buffered copy when the kernel refuses.

use ferrorep_types::{Error, FileSize, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a file's bytes were moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransferMethod {
    /// Linux `copy_file_range`
    CopyFileRange,
    /// Buffered read/write through `tokio::fs::copy`
    Fallback,
}

/// Outcome of one file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransferOutcome {
    /// Bytes written to the destination
    pub bytes: FileSize,
    /// Primitive that moved them
    pub method: TransferMethod,
}

/// Zero-copy engine configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZeroCopyConfig {
    /// Whether zero-copy primitives are tried at all
    pub enabled: bool,
    /// Files smaller than this go straight to the fallback
    pub min_file_size: u64,
}

impl Default for ZeroCopyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_file_size: 4096,
        }
    }
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZeroCopyStats {
    /// Transfers completed by a zero-copy primitive
    pub zero_copy_transfers: u64,
    /// Transfers completed by the fallback
    pub fallback_transfers: u64,
    /// Bytes moved by a zero-copy primitive
    pub bytes_zero_copied: u64,
    /// Bytes moved by the fallback
    pub bytes_fallback: u64,
}

impl ZeroCopyStats {
    /// Share of bytes moved without user-space buffering
    pub fn efficiency(&self) -> f64 {
        let total_bytes = self.bytes_zero_copied + self.bytes_fallback;
        if total_bytes == 0 {
            0.0
        } else {
            self.bytes_zero_copied as f64 / total_bytes as f64
        }
    }
}

/// Shared file transfer engine; one instance serves all workers of a run
#[derive(Debug, Default)]
pub struct ZeroCopyEngine {
    config: ZeroCopyConfig,
    zero_copy_transfers: AtomicU64,
    fallback_transfers: AtomicU64,
    bytes_zero_copied: AtomicU64,
    bytes_fallback: AtomicU64,
}

impl ZeroCopyEngine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a custom configuration
    pub fn with_config(config: ZeroCopyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current counters
    pub fn stats(&self) -> ZeroCopyStats {
        ZeroCopyStats {
            zero_copy_transfers: self.zero_copy_transfers.load(Ordering::Relaxed),
            fallback_transfers: self.fallback_transfers.load(Ordering::Relaxed),
            bytes_zero_copied: self.bytes_zero_copied.load(Ordering::Relaxed),
            bytes_fallback: self.bytes_fallback.load(Ordering::Relaxed),
        }
    }

    /// Copy `source` over `destination`, creating or truncating it
    ///
    /// The destination's parent directory must already exist.
    pub async fn transfer(&self, source: &Path, destination: &Path) -> Result<TransferOutcome> {
        let size = tokio::fs::metadata(source).await?.len();

        if self.config.enabled && size >= self.config.min_file_size {
            #[cfg(target_os = "linux")]
            {
                if let Some(bytes) = self.try_copy_file_range(source, destination, size).await? {
                    self.zero_copy_transfers.fetch_add(1, Ordering::Relaxed);
                    self.bytes_zero_copied.fetch_add(bytes, Ordering::Relaxed);
                    return Ok(TransferOutcome {
                        bytes,
                        method: TransferMethod::CopyFileRange,
                    });
                }
            }
        }

        let bytes = tokio::fs::copy(source, destination).await?;
        self.fallback_transfers.fetch_add(1, Ordering::Relaxed);
        self.bytes_fallback.fetch_add(bytes, Ordering::Relaxed);
        Ok(TransferOutcome {
            bytes,
            method: TransferMethod::Fallback,
        })
    }

    /// `Ok(None)` when the kernel cannot do it and the fallback should run
    #[cfg(target_os = "linux")]
    async fn try_copy_file_range(
        &self,
        source: &Path,
        destination: &Path,
        size: u64,
    ) -> Result<Option<u64>> {
        let source_file = std::fs::File::open(source)?;
        let dest_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(destination)?;

        let result = tokio::task::spawn_blocking(move || {
            crate::linux::copy_file_range_blocking(&source_file, &dest_file, size)
        })
        .await
        .map_err(|e| Error::io(format!("Task join error: {}", e)))?;

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if crate::linux::is_unsupported(&e) => {
                debug!("copy_file_range unsupported for {}: {}", source.display(), e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(0)]
    #[case(10)]
    #[case(2 * 1024 * 1024)]
    #[tokio::test]
    async fn test_transfer_preserves_size(#[case] size: usize) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        let destination = dir.path().join("dest.bin");
        tokio::fs::write(&source, vec![7u8; size]).await.unwrap();

        let engine = ZeroCopyEngine::new();
        let outcome = engine.transfer(&source, &destination).await.unwrap();

        assert_eq!(outcome.bytes, size as u64);
        assert_eq!(
            tokio::fs::metadata(&destination).await.unwrap().len(),
            size as u64
        );
    }

    #[tokio::test]
    async fn test_small_files_use_fallback() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("small.txt");
        tokio::fs::write(&source, b"hello").await.unwrap();

        let engine = ZeroCopyEngine::new();
        let outcome = engine
            .transfer(&source, &dir.path().join("copy.txt"))
            .await
            .unwrap();

        assert_eq!(outcome.method, TransferMethod::Fallback);
        assert_eq!(engine.stats().fallback_transfers, 1);
        assert_eq!(engine.stats().bytes_fallback, 5);
    }

    #[tokio::test]
    async fn test_overwrites_larger_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        let destination = dir.path().join("dest.bin");
        tokio::fs::write(&source, vec![1u8; 8192]).await.unwrap();
        tokio::fs::write(&destination, vec![2u8; 20000]).await.unwrap();

        ZeroCopyEngine::new()
            .transfer(&source, &destination)
            .await
            .unwrap();

        assert_eq!(tokio::fs::metadata(&destination).await.unwrap().len(), 8192);
    }

    #[tokio::test]
    async fn test_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let error = ZeroCopyEngine::new()
            .transfer(&dir.path().join("missing"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ferrorep_types::ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_disabled_engine_always_falls_back() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("large.bin");
        tokio::fs::write(&source, vec![3u8; 64 * 1024]).await.unwrap();

        let engine = ZeroCopyEngine::with_config(ZeroCopyConfig {
            enabled: false,
            ..ZeroCopyConfig::default()
        });
        let outcome = engine
            .transfer(&source, &dir.path().join("copy.bin"))
            .await
            .unwrap();

        assert_eq!(outcome.method, TransferMethod::Fallback);
        let stats = engine.stats();
        assert_eq!(stats.zero_copy_transfers, 0);
        assert_eq!(stats.bytes_fallback, 64 * 1024);
        assert_eq!(stats.efficiency(), 0.0);
    }

    #[test]
    fn test_efficiency() {
        let stats = ZeroCopyStats {
            bytes_zero_copied: 300,
            bytes_fallback: 100,
            ..ZeroCopyStats::default()
        };
        assert!((stats.efficiency() - 0.75).abs() < f64::EPSILON);
        assert_eq!(ZeroCopyStats::default().efficiency(), 0.0);
    }
}
