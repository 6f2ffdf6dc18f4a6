//! Zero-copy file transfer for FerroRep
//!
//! Used by the unprivileged replication mode, where the process copies files
//! itself instead of delegating to a privileged shell.
//!
//! # Platform Support
//!
//! - **Linux**: `copy_file_range` (reflink on filesystems that support it)
//! - **Elsewhere**: buffered `tokio::fs::copy`
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrorep_zerocopy::ZeroCopyEngine;
//! use std::path::Path;
//!
//! # async fn example() -> ferrorep_types::Result<()> {
//! let engine = ZeroCopyEngine::new();
//! let outcome = engine
//!     .transfer(Path::new("source.bin"), Path::new("dest.bin"))
//!     .await?;
//! println!("{} bytes via {:?}", outcome.bytes, outcome.method);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;

#[cfg(target_os = "linux")]
pub mod linux;

pub use engine::{TransferMethod, TransferOutcome, ZeroCopyConfig, ZeroCopyEngine, ZeroCopyStats};
