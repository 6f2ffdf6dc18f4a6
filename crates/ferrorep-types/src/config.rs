//! Validated configuration values for FerroRep
//!
//! Small newtypes shared by the configuration crate and the engine so that an
//! out-of-range value is rejected once, at load time.

/// Worker count with validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadCount(usize);

impl ThreadCount {
    /// Minimum worker count
    pub const MIN: usize = 1;
    /// Maximum worker count
    pub const MAX: usize = 256;
    /// Cap applied to the derived unprivileged worker count
    pub const UNPRIVILEGED_CAP: usize = 16;

    /// Create a new worker count with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Thread count {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Thread count {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Get the worker count value
    pub fn get(self) -> usize {
        self.0
    }

    /// Twice the CPU count, capped for direct file copies
    pub fn unprivileged_default() -> Self {
        Self((num_cpus::get() * 2).clamp(Self::MIN, Self::UNPRIVILEGED_CAP))
    }

    /// Two concurrent shell copies through a privileged channel
    pub fn privileged_default() -> Self {
        Self(2)
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::unprivileged_default()
    }
}

/// Number of paths handed to one verification command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchSize(usize);

impl BatchSize {
    /// Minimum batch size
    pub const MIN: usize = 1;
    /// Maximum batch size; keeps command lines under common ARG_MAX limits
    pub const MAX: usize = 10_000;
    /// Default batch size
    pub const DEFAULT: usize = 500;

    /// Create a new batch size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Batch size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Batch size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the batch size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Thresholds that turn a directory into a single bulk copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionLimits {
    /// Directories sitting deeper than this below the sub-root are copied in bulk
    pub max_depth: usize,
    /// Directories with more direct children than this are copied in bulk
    pub max_fan_out: usize,
}

impl PartitionLimits {
    /// Create new limits; both must be non-zero
    pub fn new(max_depth: usize, max_fan_out: usize) -> Result<Self, String> {
        if max_depth == 0 {
            return Err("max_depth must be greater than 0".to_string());
        }
        if max_fan_out == 0 {
            return Err("max_fan_out must be greater than 0".to_string());
        }
        Ok(Self {
            max_depth,
            max_fan_out,
        })
    }

    /// Whether a directory at `depth` below the sub-root with `fan_out`
    /// immediate children must be copied in bulk
    pub fn requires_bulk(&self, depth: usize, fan_out: usize) -> bool {
        depth > self.max_depth || fan_out > self.max_fan_out
    }
}

impl Default for PartitionLimits {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_fan_out: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_unprivileged_default_is_capped() {
        let count = ThreadCount::unprivileged_default().get();
        assert!(count >= 1);
        assert!(count <= ThreadCount::UNPRIVILEGED_CAP);
        assert_eq!(ThreadCount::privileged_default().get(), 2);
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(500, true)]
    #[case(10_000, true)]
    #[case(10_001, false)]
    fn test_batch_size_bounds(#[case] size: usize, #[case] valid: bool) {
        assert_eq!(BatchSize::new(size).is_ok(), valid);
    }

    #[rstest]
    #[case(2, 100, false)]
    #[case(3, 100, true)]
    #[case(2, 101, true)]
    #[case(0, 0, false)]
    fn test_requires_bulk(#[case] depth: usize, #[case] fan_out: usize, #[case] bulk: bool) {
        assert_eq!(PartitionLimits::default().requires_bulk(depth, fan_out), bulk);
    }

    #[test]
    fn test_partition_limits_reject_zero() {
        assert!(PartitionLimits::new(0, 10).is_err());
        assert!(PartitionLimits::new(2, 0).is_err());
        assert!(PartitionLimits::new(1, 1).is_ok());
    }
}
