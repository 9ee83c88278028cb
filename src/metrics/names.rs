//! Metric name constants surfaced to exporter consumers.
//!
//! These strings are the stable contract between the collector and any
//! exporter implementation; exporters label series with them rather than
//! inventing their own names.

/// Iteration counter, labeled `status in {success, failure}`.
pub const EXECUTION_COUNT: &str = "vajrapulse.execution.count";

/// Latency gauge per `{status, percentile}`.
pub const EXECUTION_DURATION: &str = "vajrapulse.execution.duration";

/// Success percentage gauge.
pub const SUCCESS_RATE: &str = "vajrapulse.success.rate";

/// In-flight iteration gauge.
pub const QUEUE_SIZE: &str = "vajrapulse.execution.queue.size";

/// Submit-to-start wait histogram.
pub const QUEUE_WAIT_TIME: &str = "vajrapulse.execution.queue.wait_time";

/// Engine state gauge: 0 stopped, 1 running, 2 stopping.
pub const ENGINE_STATE: &str = "vajrapulse.engine.state";

/// Engine uptime gauge in milliseconds.
pub const ENGINE_UPTIME_MS: &str = "vajrapulse.engine.uptime.ms";

/// Lifecycle counter, labeled `event in {start, stop, complete}`.
pub const ENGINE_LIFECYCLE_EVENTS: &str = "vajrapulse.engine.lifecycle.events";

/// Failed shutdown callback counter.
pub const SHUTDOWN_CALLBACK_FAILURES: &str = "vajrapulse.shutdown.callback.failures";

/// Iterations dropped by backpressure handling.
pub const BACKPRESSURE_DROPPED: &str = "vajrapulse.backpressure.dropped";

/// Iterations rejected by backpressure handling.
pub const BACKPRESSURE_REJECTED: &str = "vajrapulse.backpressure.rejected";
