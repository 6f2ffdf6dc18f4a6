//! Core type system and error handling for FerroRep
//!
//! This crate provides the foundational types shared by the replication engine,
//! the command channels and the CLI. It includes:
//!
//! - **Error handling**: run-level error types with severity levels and context
//! - **Core types**: requests, copy tasks, progress tuples and terminal results
//! - **Traits**: progress sink, job status store and the privileged command channel
//! - **Configuration**: validated worker counts, batch sizes and partition limits
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `async`: Enable async trait definitions and the command channel
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use ferrorep_types::{CopyTask, ReplicationRequest};
//!
//! let request = ReplicationRequest::new("/data/app", "com.example.app").incremental(true);
//! assert!(request.incremental);
//!
//! let task = CopyTask::file("/data/app/a.txt", "/dst/a.txt", 10);
//! assert_eq!(task.display_name(), "a.txt");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "async")]
pub mod channel;
pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
#[cfg(feature = "async")]
pub use channel::{CommandChannel, CommandStream};
pub use config::{BatchSize, PartitionLimits, ThreadCount};
pub use error::{Error, ErrorContext, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::*;
pub use types::*;
