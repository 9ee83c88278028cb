//! Metrics pipeline: per-iteration records, the thread-safe collector,
//! aggregated snapshots, and the periodic reporter.

pub mod collector;
pub mod names;
pub mod record;
pub mod reporter;
pub mod snapshot;

pub use collector::{EngineState, LifecycleEvent, MetricsCollector, DEFAULT_QUANTILES};
pub use record::{sanitize_quantiles, ExecutionMetrics, Quantile};
pub use reporter::PeriodicReporter;
pub use snapshot::{AggregatedMetrics, LatencyStats, PercentileMap};
