//! Replication engine for FerroRep
//!
//! This crate mirrors one application data subtree into a destination location
//! that needs elevated access, picking the fastest privilege mode available and
//! reporting progress the whole way.
//!
//! # Features
//!
//! - **Mode selection**: root batch, brokered batch or unprivileged concurrent copy
//! - **Partitioning**: one traversal yields copy tasks and the verification manifest
//! - **Execution**: semaphore-bounded workers with cooperative pause and cancel
//! - **Progress**: live sink plus a throttled, durable job status store
//! - **Verification**: batched size checks after the copy phase
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrorep_config::Config;
//! use ferrorep_engine::{ChannelSet, ReplicationEngine};
//! use ferrorep_types::ReplicationRequest;
//!
//! # async fn example() -> ferrorep_types::Result<()> {
//! let engine = ReplicationEngine::new(Config::default(), ChannelSet::unprivileged_only());
//! let request = ReplicationRequest::new("/data/data", "com.example.app");
//! let result = engine.replicate(request).await?;
//! println!("{} of {} files copied", result.processed_count, result.total_files);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod context;
pub mod control;
pub mod engine;
pub mod executor;
pub mod failures;
pub mod parser;
pub mod partition;
pub mod progress;
pub mod rate;
pub mod selector;
pub mod status;
pub mod verify;
pub mod watchdog;

pub use context::RunContext;
pub use control::{Checkpoint, RunControl};
pub use engine::{EngineBuilder, ReplicationEngine, RunHandle};
pub use executor::{CopyExecutor, ExecutionOutcome};
pub use failures::FailureLog;
pub use parser::{LineMatcher, LineOutcome, OutputParser, ParsedLine};
pub use partition::{partition, partition_async, Partition};
pub use progress::{ProgressReporter, ProgressTracker};
pub use rate::RateEstimator;
pub use selector::{select_mode, ChannelSet, ModeSelector, Selection};
pub use status::{JsonFileStatusStore, MemoryStatusStore};
pub use verify::{verify, Mismatch, VerificationReport};
pub use watchdog::Watchdog;
