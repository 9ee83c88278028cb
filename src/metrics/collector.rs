//! Thread-safe metrics sink.
//!
//! [`MetricsCollector`] is the many-writers / many-readers hub of a run:
//! workers record [`ExecutionMetrics`] concurrently, the periodic reporter
//! and the final export read [`snapshot`](MetricsCollector::snapshot)
//! concurrently with those writes. Counters and gauges are plain atomics;
//! latencies go into HdrHistograms split across a fixed set of shards so
//! the hot path never contends on a single lock. Shards are merged only at
//! snapshot time.

use super::record::{sanitize_quantiles, ExecutionMetrics, Quantile};
use super::snapshot::{AggregatedMetrics, LatencyStats, PercentileMap};
use crate::pattern::MetricsProvider;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;

/// Number of histogram shards; iteration numbers select a shard by modulo.
const SHARD_COUNT: usize = 8;

/// Histogram upper bound: 60 s in nanoseconds. Longer iterations saturate.
const HISTOGRAM_MAX_NANOS: u64 = 60_000_000_000;

/// Three significant figures, the HdrHistogram sweet spot for latency data.
const HISTOGRAM_SIGFIGS: u8 = 3;

/// Default percentile set used when none is configured.
pub const DEFAULT_QUANTILES: &[f64] = &[0.5, 0.9, 0.95, 0.99, 0.999];

/// Engine lifecycle state exposed through the state gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Not running (initial and terminal state).
    Stopped = 0,
    /// Coordinator loop is submitting iterations.
    Running = 1,
    /// Draining in-flight work.
    Stopping = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Lifecycle event counted per engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The engine entered the running state.
    Start,
    /// The run ended because `stop()` was requested.
    Stop,
    /// The run ended because the pattern duration elapsed.
    Complete,
}

struct HistogramShard {
    success: Histogram<u64>,
    failure: Histogram<u64>,
    queue_wait: Histogram<u64>,
}

impl HistogramShard {
    fn new() -> Self {
        Self {
            success: new_histogram(),
            failure: new_histogram(),
            queue_wait: new_histogram(),
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NANOS, HISTOGRAM_SIGFIGS)
        .expect("valid histogram params")
}

/// Thread-safe sink for iteration metrics.
///
/// The collector is the injected meter registry of a run: the engine writes
/// to it, the reporter and pipeline read from it, and nothing about it is
/// process-global. Cheap atomic counters back every read the rate loop and
/// gauges need; histogram shards are locked individually and only briefly.
pub struct MetricsCollector {
    run_id: Option<String>,
    quantiles: Vec<Quantile>,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    queue_size: AtomicU64,
    dropped_count: AtomicU64,
    rejected_count: AtomicU64,
    pool_size: AtomicU64,
    engine_state: AtomicU8,
    starts: AtomicU64,
    stops: AtomicU64,
    completes: AtomicU64,
    shutdown_callback_failures: AtomicU64,
    run_started: Mutex<Option<Instant>>,
    queue_wait_cursor: AtomicUsize,
    shards: Vec<Mutex<HistogramShard>>,
}

impl MetricsCollector {
    /// Creates a collector with the given percentile configuration.
    ///
    /// The list is sanitized: rounded to three decimals, restricted to
    /// `(0.0, 1.0]`, sorted, deduplicated. Snapshots contain exactly the
    /// sanitized set.
    pub fn new(quantiles: &[f64]) -> Self {
        Self {
            run_id: None,
            quantiles: sanitize_quantiles(quantiles),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            queue_size: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            pool_size: AtomicU64::new(0),
            engine_state: AtomicU8::new(EngineState::Stopped as u8),
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
            completes: AtomicU64::new(0),
            shutdown_callback_failures: AtomicU64::new(0),
            run_started: Mutex::new(None),
            queue_wait_cursor: AtomicUsize::new(0),
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HistogramShard::new())).collect(),
        }
    }

    /// Creates a collector with the default percentile set.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_QUANTILES)
    }

    /// Tags the collector with a run id the engine can adopt.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Run id tag, if one was set.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// The sanitized percentile configuration.
    pub fn quantiles(&self) -> &[Quantile] {
        &self.quantiles
    }

    /// Records one completed iteration. Constant-time: two atomic ops and
    /// one short per-shard lock.
    pub fn record(&self, metrics: &ExecutionMetrics) {
        let nanos = metrics.duration_nanos().max(1);
        let shard_idx = metrics.iteration() as usize % SHARD_COUNT;
        let mut shard = self.shards[shard_idx].lock();
        if metrics.is_success() {
            self.success_count.fetch_add(1, Ordering::Release);
            shard.success.saturating_record(nanos);
        } else {
            self.failure_count.fetch_add(1, Ordering::Release);
            shard.failure.saturating_record(nanos);
        }
    }

    /// Records a submit-to-start queue wait.
    pub fn record_queue_wait(&self, nanos: u64) {
        let idx = self.queue_wait_cursor.fetch_add(1, Ordering::Relaxed) % SHARD_COUNT;
        self.shards[idx].lock().queue_wait.saturating_record(nanos.max(1));
    }

    /// Sets the in-flight iteration gauge.
    pub fn update_queue_size(&self, size: u64) {
        self.queue_size.store(size, Ordering::Release);
    }

    /// Current in-flight iteration gauge value.
    pub fn queue_size(&self) -> u64 {
        self.queue_size.load(Ordering::Acquire)
    }

    /// Counts an iteration discarded by the `Drop`/`Threshold` handlers.
    pub fn record_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an iteration refused by the `Reject` handler.
    pub fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed shutdown callback.
    pub fn record_shutdown_callback_failure(&self) {
        self.shutdown_callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed shutdown callback count.
    pub fn shutdown_callback_failures(&self) -> u64 {
        self.shutdown_callback_failures.load(Ordering::Relaxed)
    }

    /// Sets the worker pool size gauge; zero means unbounded.
    pub fn set_pool_size(&self, size: u64) {
        self.pool_size.store(size, Ordering::Relaxed);
    }

    /// Worker pool size gauge; zero means unbounded.
    pub fn pool_size(&self) -> u64 {
        self.pool_size.load(Ordering::Relaxed)
    }

    /// Sets the engine state gauge.
    pub fn set_engine_state(&self, state: EngineState) {
        self.engine_state.store(state as u8, Ordering::Release);
    }

    /// Current engine state gauge value.
    pub fn engine_state(&self) -> EngineState {
        EngineState::from_u8(self.engine_state.load(Ordering::Acquire))
    }

    /// Counts a lifecycle event.
    pub fn record_lifecycle(&self, event: LifecycleEvent) {
        let counter = match event {
            LifecycleEvent::Start => &self.starts,
            LifecycleEvent::Stop => &self.stops,
            LifecycleEvent::Complete => &self.completes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Lifecycle event count.
    pub fn lifecycle_count(&self, event: LifecycleEvent) -> u64 {
        match event {
            LifecycleEvent::Start => self.starts.load(Ordering::Relaxed),
            LifecycleEvent::Stop => self.stops.load(Ordering::Relaxed),
            LifecycleEvent::Complete => self.completes.load(Ordering::Relaxed),
        }
    }

    /// Marks the start of a run; the uptime gauge and snapshot elapsed time
    /// are measured from this instant.
    pub fn mark_run_started(&self) {
        *self.run_started.lock() = Some(Instant::now());
    }

    /// Milliseconds since the run started; zero before the first run.
    pub fn uptime_millis(&self) -> u64 {
        self.run_started
            .lock()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Total recorded iterations.
    pub fn total_executions(&self) -> u64 {
        self.success_count.load(Ordering::Acquire) + self.failure_count.load(Ordering::Acquire)
    }

    /// Produces a coherent point-in-time snapshot.
    ///
    /// Safe to call concurrently with `record`: counters read here are at
    /// least as fresh as at call entry, and shard locks are taken one at a
    /// time so writers are never blocked behind the whole merge.
    pub fn snapshot(&self) -> AggregatedMetrics {
        let success_count = self.success_count.load(Ordering::Acquire);
        let failure_count = self.failure_count.load(Ordering::Acquire);

        let mut success = new_histogram();
        let mut failure = new_histogram();
        let mut queue_wait = new_histogram();
        for shard in &self.shards {
            let guard = shard.lock();
            let _ = success.add(&guard.success);
            let _ = failure.add(&guard.failure);
            let _ = queue_wait.add(&guard.queue_wait);
        }

        AggregatedMetrics {
            total_executions: success_count + failure_count,
            success_count,
            failure_count,
            elapsed_millis: self.uptime_millis(),
            queue_size: self.queue_size(),
            success_percentiles: self.percentiles(&success),
            failure_percentiles: self.percentiles(&failure),
            queue_wait_percentiles: self.percentiles(&queue_wait),
            success_stats: stats(&success),
            failure_stats: stats(&failure),
            dropped_count: self.dropped_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
        }
    }

    fn percentiles(&self, histogram: &Histogram<u64>) -> PercentileMap {
        self.quantiles
            .iter()
            .map(|&q| (q, histogram.value_at_quantile(q.as_f64())))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn stats(histogram: &Histogram<u64>) -> Option<LatencyStats> {
    if histogram.is_empty() {
        return None;
    }
    Some(LatencyStats {
        mean: histogram.mean(),
        std_dev: histogram.stdev(),
        min: histogram.min(),
        max: histogram.max(),
        count: histogram.len(),
    })
}

/// The collector doubles as the health signal for the adaptive pattern.
impl MetricsProvider for MetricsCollector {
    fn failure_rate(&self) -> f64 {
        let success = self.success_count.load(Ordering::Acquire);
        let failure = self.failure_count.load(Ordering::Acquire);
        let total = success + failure;
        if total == 0 {
            return 0.0;
        }
        failure as f64 / total as f64
    }
}
