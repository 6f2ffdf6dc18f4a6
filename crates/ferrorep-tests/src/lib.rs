//! FerroRep Testing Suite
//!
//! Integration tests that drive the replication engine end to end against real
//! temporary trees, plus benchmarks for the scan and copy paths.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Tree builders, a recording progress sink and scriptable privileged
/// channels shared by the integration tests and benchmarks.
pub mod test_utils;
