//! Result type alias for FerroRep operations

use crate::Error;

/// Result type alias for FerroRep operations
pub type Result<T> = std::result::Result<T, Error>;
