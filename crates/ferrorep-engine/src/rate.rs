//! Smoothed throughput estimation

use std::time::Instant;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Exponentially weighted moving average over bytes-per-second samples
#[derive(Debug, Clone)]
pub struct RateEstimator {
    alpha: f64,
    last_sample: Option<(u64, Instant)>,
    smoothed: Option<f64>,
}

impl RateEstimator {
    /// Create an estimator; `alpha` is the weight of the newest sample
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            last_sample: None,
            smoothed: None,
        }
    }

    /// Feed a cumulative byte count and return the smoothed bytes per second
    ///
    /// Samples that go backwards or arrive with no elapsed time are ignored.
    pub fn record(&mut self, cumulative_bytes: u64, at: Instant) -> f64 {
        let Some((last_bytes, last_at)) = self.last_sample else {
            self.last_sample = Some((cumulative_bytes, at));
            return self.bytes_per_second();
        };

        if cumulative_bytes < last_bytes || at <= last_at {
            return self.bytes_per_second();
        }

        let elapsed = at.duration_since(last_at).as_secs_f64();
        let instant_rate = (cumulative_bytes - last_bytes) as f64 / elapsed;
        self.smoothed = Some(match self.smoothed {
            Some(previous) => self.alpha * instant_rate + (1.0 - self.alpha) * previous,
            None => instant_rate,
        });
        self.last_sample = Some((cumulative_bytes, at));
        self.bytes_per_second()
    }

    /// Current smoothed rate in bytes per second
    pub fn bytes_per_second(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }

    /// Current smoothed rate in MB/s
    pub fn mbps(&self) -> f64 {
        self.bytes_per_second() / BYTES_PER_MB
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(0.3)
    }
}
