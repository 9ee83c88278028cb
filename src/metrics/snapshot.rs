//! Point-in-time aggregated view of a run.

use super::record::Quantile;
use std::collections::BTreeMap;

/// Sorted map from percentile key to latency nanoseconds.
pub type PercentileMap = BTreeMap<Quantile, u64>;

/// Summary statistics computed from a latency histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    /// Mean latency in nanoseconds.
    pub mean: f64,
    /// Standard deviation in nanoseconds.
    pub std_dev: f64,
    /// Minimum recorded latency in nanoseconds.
    pub min: u64,
    /// Maximum recorded latency in nanoseconds.
    pub max: u64,
    /// Number of recorded values.
    pub count: u64,
}

/// Immutable aggregated snapshot of the metrics collector.
///
/// Invariant: `total_executions == success_count + failure_count`. The
/// percentile maps contain exactly the sanitized quantiles the collector was
/// configured with, in ascending order.
#[derive(Debug, Clone)]
pub struct AggregatedMetrics {
    /// Iterations recorded, success plus failure.
    pub total_executions: u64,
    /// Iterations that returned a success result.
    pub success_count: u64,
    /// Iterations that returned a failure result.
    pub failure_count: u64,
    /// Milliseconds since the run started when the snapshot was taken.
    pub elapsed_millis: u64,
    /// In-flight iterations at snapshot time.
    pub queue_size: u64,
    /// Latency percentiles over successful iterations.
    pub success_percentiles: PercentileMap,
    /// Latency percentiles over failed iterations.
    pub failure_percentiles: PercentileMap,
    /// Submit-to-start queue-wait percentiles.
    pub queue_wait_percentiles: PercentileMap,
    /// Summary statistics for successes; `None` when nothing succeeded.
    pub success_stats: Option<LatencyStats>,
    /// Summary statistics for failures; `None` when nothing failed.
    pub failure_stats: Option<LatencyStats>,
    /// Iterations discarded by the `Drop`/`Threshold` backpressure handlers.
    pub dropped_count: u64,
    /// Iterations refused by the `Reject` backpressure handler.
    pub rejected_count: u64,
}

impl AggregatedMetrics {
    /// Success percentage in `[0, 100]`; zero when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        100.0 * self.success_count as f64 / self.total_executions as f64
    }

    /// Achieved successful transactions per second; zero when no time elapsed.
    pub fn success_tps(&self) -> f64 {
        Self::per_second(self.success_count, self.elapsed_millis)
    }

    /// Achieved failed transactions per second; zero when no time elapsed.
    pub fn failure_tps(&self) -> f64 {
        Self::per_second(self.failure_count, self.elapsed_millis)
    }

    /// Achieved overall transactions per second; zero when no time elapsed.
    pub fn total_tps(&self) -> f64 {
        Self::per_second(self.total_executions, self.elapsed_millis)
    }

    fn per_second(count: u64, elapsed_millis: u64) -> f64 {
        if elapsed_millis == 0 {
            return 0.0;
        }
        count as f64 * 1000.0 / elapsed_millis as f64
    }
}
