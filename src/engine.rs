//! Execution engine: the composition root of a run.
//!
//! [`ExecutionEngine::run`] wires the rate controller, the worker pool, the
//! executor, the collector, and the shutdown manager into one run:
//!
//! 1. resolve the run id and the worker pool strategy,
//! 2. `task.init()` (failure propagates, teardown is skipped),
//! 3. coordinator loop: wait for the rate controller, submit one
//!    executor-wrapped iteration per slot, applying the configured
//!    backpressure handling when the pool is full,
//! 4. drain and force via the shutdown manager, run teardown, and take the
//!    final snapshot after every worker has terminated.
//!
//! The coordinator is the only place the engine suspends to honour the
//! target rate; workers suspend only inside `task.execute`. No lock is held
//! across a call into the task.

use crate::config::{ExecutionConfig, ObservabilityConfig, ThreadPoolStrategy, VajraPulseConfig};
use crate::error::{EngineError, TaskError};
use crate::executor::TaskExecutor;
use crate::metrics::collector::LifecycleEvent;
use crate::metrics::{AggregatedMetrics, EngineState, ExecutionMetrics, MetricsCollector};
use crate::pattern::LoadPattern;
use crate::rate::RateController;
use crate::shutdown::{ShutdownManager, SignalHook};
use crate::task::{Task, TaskResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Policy applied when an iteration cannot be submitted immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureHandler {
    /// Wait for a pool slot; the submission is delayed, never lost.
    #[default]
    Queue,
    /// Discard the iteration and count it as dropped.
    Drop,
    /// Refuse the iteration and count it as rejected.
    Reject,
    /// Queue while in-flight work is below `max_queue`, drop above it.
    Threshold {
        /// In-flight iteration bound.
        max_queue: usize,
    },
}

enum Admission {
    Proceed(Option<OwnedSemaphorePermit>),
    Skip,
}

/// Rate-controlled task execution engine.
///
/// The engine exclusively owns its worker tracker, rate controller, and
/// shutdown manager; the collector is shared with the reporter and final
/// export. One engine drives one run.
pub struct ExecutionEngine {
    task: Arc<dyn Task>,
    pattern: Arc<dyn LoadPattern>,
    collector: Arc<MetricsCollector>,
    run_id_override: Option<String>,
    execution: ExecutionConfig,
    observability: ObservabilityConfig,
    backpressure: BackpressureHandler,
    shutdown: Arc<ShutdownManager>,
    custom_shutdown: bool,
    handle_signals: bool,
    stop: CancellationToken,
    signal_hook: Mutex<Option<SignalHook>>,
    closed: AtomicBool,
}

impl ExecutionEngine {
    /// Creates an engine with default configuration.
    pub fn new(
        task: Arc<dyn Task>,
        pattern: Arc<dyn LoadPattern>,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        let execution = ExecutionConfig::default();
        let shutdown = Arc::new(ShutdownManager::new(
            execution.drain_timeout,
            execution.force_timeout,
        ));
        Self {
            task,
            pattern,
            collector,
            run_id_override: None,
            execution,
            observability: ObservabilityConfig::default(),
            backpressure: BackpressureHandler::default(),
            shutdown,
            custom_shutdown: false,
            handle_signals: false,
            stop: CancellationToken::new(),
            signal_hook: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets an explicit run id (takes precedence over the collector tag).
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id_override = Some(run_id.into());
        self
    }

    /// Applies execution settings. Unless a custom shutdown manager was
    /// supplied, the drain and force budgets are taken from this config.
    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        if !self.custom_shutdown {
            self.shutdown = Arc::new(ShutdownManager::new(
                config.drain_timeout,
                config.force_timeout,
            ));
        }
        self.execution = config;
        self
    }

    /// Applies observability settings (spans, sampling, live export).
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability = config;
        self
    }

    /// Sets the backpressure policy for full-pool submissions.
    pub fn with_backpressure(mut self, handler: BackpressureHandler) -> Self {
        self.backpressure = handler;
        self
    }

    /// Supplies a shutdown manager, e.g. to register shutdown callbacks.
    /// Its drain/force budgets take precedence over the execution config.
    pub fn with_shutdown_manager(mut self, manager: ShutdownManager) -> Self {
        self.shutdown = Arc::new(manager);
        self.custom_shutdown = true;
        self
    }

    /// Installs a Ctrl-C hook for the duration of the run. The hook is
    /// removed when the run finishes or the engine is closed.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// The shared collector.
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// The shutdown manager driving this engine's termination.
    pub fn shutdown_manager(&self) -> &Arc<ShutdownManager> {
        &self.shutdown
    }

    /// Requests a stop. Idempotent and safe from any thread; the
    /// coordinator observes the flag at its next iteration.
    pub fn stop(&self) {
        self.stop.cancel();
        self.shutdown.initiate_shutdown();
    }

    /// Releases run-scoped resources (currently the signal hook). Safe to
    /// call multiple times; also invoked on drop so the pipeline's scoped
    /// ownership releases everything deterministically.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(hook) = self.signal_hook.lock().take() {
            hook.remove();
        }
    }

    fn resolve_run_id(&self) -> String {
        self.run_id_override
            .clone()
            .or_else(|| self.collector.run_id().map(String::from))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn resolve_pool(&self) -> Option<Arc<Semaphore>> {
        let strategy = self
            .task
            .thread_preference()
            .unwrap_or(self.execution.default_thread_pool);
        match strategy {
            ThreadPoolStrategy::Virtual | ThreadPoolStrategy::Auto => None,
            ThreadPoolStrategy::Platform => {
                let size = self.execution.resolved_platform_pool_size();
                Some(Arc::new(Semaphore::new(size)))
            }
        }
    }

    /// Drives the run to completion and returns the final snapshot.
    ///
    /// Returns an error only for invalid configuration, a failed
    /// `task.init()` (in which case teardown is skipped), or shutdown
    /// callback failures (which still carry the final snapshot).
    pub async fn run(&self) -> Result<AggregatedMetrics, EngineError> {
        VajraPulseConfig {
            execution: self.execution.clone(),
            observability: self.observability.clone(),
        }
        .validate()?;

        let run_id = self.resolve_run_id();
        let pool = self.resolve_pool();
        let pool_size = pool
            .as_ref()
            .map(|sem| sem.available_permits() as u64)
            .unwrap_or(0);
        self.collector.set_pool_size(pool_size);

        if let Err(source) = self.task.init().await {
            warn!(%source, "task init failed; run aborted");
            return Err(EngineError::Init { source });
        }

        self.collector.mark_run_started();
        self.collector.set_engine_state(EngineState::Running);
        self.collector.record_lifecycle(LifecycleEvent::Start);
        info!(run_id = %run_id, pool_size, "run started");

        if self.handle_signals {
            *self.signal_hook.lock() = Some(ShutdownManager::install_signal_hook(
                &self.shutdown,
                self.stop.clone(),
            ));
        }

        let epoch = Instant::now();
        let executor = TaskExecutor::new(Arc::clone(&self.task), run_id.as_str(), epoch)
            .with_tracing(
                self.observability.tracing_enabled,
                self.observability.tracing_sample_rate,
            );
        let mut rate = RateController::new(Arc::clone(&self.pattern));
        let tracker = TaskTracker::new();
        let in_flight = Arc::new(AtomicU64::new(0));
        let force = self.shutdown.force_token();
        let duration = self.pattern.duration();
        let duration_ms = duration.as_millis() as u64;
        let run_deadline = tokio::time::Instant::now() + duration;
        let mut iteration: u64 = 0;

        loop {
            if self.stop.is_cancelled() || rate.elapsed_millis() >= duration_ms {
                break;
            }
            tokio::select! {
                () = rate.wait_for_next() => {}
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep_until(run_deadline) => break,
            }

            let permit = match self.admit(pool.as_ref(), &in_flight).await {
                Admission::Proceed(permit) => permit,
                Admission::Skip => continue,
            };

            let submit_nanos = executor.monotonic_nanos();
            let worker_executor = executor.clone();
            let worker_collector = Arc::clone(&self.collector);
            let worker_in_flight = Arc::clone(&in_flight);
            let worker_force = force.clone();
            tracker.spawn(async move {
                let _permit = permit;
                let current = worker_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                worker_collector.update_queue_size(current);
                let start_nanos = worker_executor.monotonic_nanos();
                worker_collector.record_queue_wait(start_nanos.saturating_sub(submit_nanos));

                let metrics = tokio::select! {
                    metrics = worker_executor.execute_with_metrics(iteration) => metrics,
                    () = worker_force.cancelled() => ExecutionMetrics::new(
                        start_nanos,
                        worker_executor.monotonic_nanos(),
                        TaskResult::failure(TaskError::Interrupted),
                        iteration,
                    ),
                };
                worker_collector.record(&metrics);

                let remaining = worker_in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
                worker_collector.update_queue_size(remaining);
            });
            iteration += 1;
        }

        let stopped = self.stop.is_cancelled();
        self.collector.set_engine_state(EngineState::Stopping);
        self.shutdown.initiate_shutdown();
        debug!(iterations = iteration, stopped, "coordinator loop exited");

        let shutdown_result = self.shutdown.await_shutdown(&tracker, &self.collector).await;

        self.collector.record_lifecycle(if stopped {
            LifecycleEvent::Stop
        } else {
            LifecycleEvent::Complete
        });
        self.collector.set_engine_state(EngineState::Stopped);

        if let Err(error) = self.task.teardown().await {
            warn!(%error, "task teardown failed");
        }
        if let Some(hook) = self.signal_hook.lock().take() {
            hook.remove();
        }

        // Final snapshot after executor termination: no in-flight metric is
        // missing from it.
        let snapshot = self.collector.snapshot();
        info!(
            run_id = %run_id,
            total = snapshot.total_executions,
            success_rate = snapshot.success_rate(),
            "run finished"
        );
        match shutdown_result {
            Ok(()) => Ok(snapshot),
            Err(source) => Err(EngineError::Shutdown {
                source,
                metrics: Box::new(snapshot),
            }),
        }
    }

    async fn admit(
        &self,
        pool: Option<&Arc<Semaphore>>,
        in_flight: &Arc<AtomicU64>,
    ) -> Admission {
        let Some(pool) = pool else {
            // Unbounded pool: only the threshold handler bounds submission.
            if let BackpressureHandler::Threshold { max_queue } = self.backpressure {
                if in_flight.load(Ordering::Acquire) >= max_queue as u64 {
                    self.collector.record_dropped();
                    return Admission::Skip;
                }
            }
            return Admission::Proceed(None);
        };

        match Arc::clone(pool).try_acquire_owned() {
            Ok(permit) => Admission::Proceed(Some(permit)),
            Err(_) => match self.backpressure {
                BackpressureHandler::Queue => self.wait_for_slot(pool).await,
                BackpressureHandler::Drop => {
                    self.collector.record_dropped();
                    Admission::Skip
                }
                BackpressureHandler::Reject => {
                    self.collector.record_rejected();
                    Admission::Skip
                }
                BackpressureHandler::Threshold { max_queue } => {
                    if in_flight.load(Ordering::Acquire) < max_queue as u64 {
                        self.wait_for_slot(pool).await
                    } else {
                        self.collector.record_dropped();
                        Admission::Skip
                    }
                }
            },
        }
    }

    async fn wait_for_slot(&self, pool: &Arc<Semaphore>) -> Admission {
        tokio::select! {
            permit = Arc::clone(pool).acquire_owned() => match permit {
                Ok(permit) => Admission::Proceed(Some(permit)),
                Err(_) => Admission::Skip,
            },
            () = self.stop.cancelled() => Admission::Skip,
        }
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::StaticLoad;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::time::Duration;

    struct OkTask;

    #[async_trait]
    impl Task for OkTask {
        async fn execute(&self, _iteration: u64) -> TaskResult {
            TaskResult::success()
        }
    }

    struct LifecycleProbe {
        inits: StdAtomicU64,
        teardowns: StdAtomicU64,
        fail_init: bool,
    }

    impl LifecycleProbe {
        fn new(fail_init: bool) -> Arc<Self> {
            Arc::new(Self {
                inits: StdAtomicU64::new(0),
                teardowns: StdAtomicU64::new(0),
                fail_init,
            })
        }
    }

    #[async_trait]
    impl Task for LifecycleProbe {
        async fn init(&self) -> Result<(), TaskError> {
            self.inits.fetch_add(1, Ordering::Relaxed);
            if self.fail_init {
                return Err(TaskError::application("init exploded"));
            }
            Ok(())
        }

        async fn execute(&self, _iteration: u64) -> TaskResult {
            TaskResult::success()
        }

        async fn teardown(&self) -> Result<(), TaskError> {
            self.teardowns.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Measures concurrent overlap of executions.
    struct ConcurrencyProbe {
        active: StdAtomicU64,
        peak: StdAtomicU64,
    }

    impl ConcurrencyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                active: StdAtomicU64::new(0),
                peak: StdAtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl Task for ConcurrencyProbe {
        async fn execute(&self, _iteration: u64) -> TaskResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            TaskResult::success()
        }

        fn thread_preference(&self) -> Option<ThreadPoolStrategy> {
            Some(ThreadPoolStrategy::Platform)
        }
    }

    fn engine_for(task: Arc<dyn Task>, tps: f64, secs: u64) -> ExecutionEngine {
        ExecutionEngine::new(
            task,
            Arc::new(StaticLoad::new(tps, Duration::from_secs(secs))),
            Arc::new(MetricsCollector::with_defaults()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_and_counts() {
        let engine = engine_for(Arc::new(OkTask), 50.0, 2);
        let snapshot = engine.run().await.unwrap();
        assert!(
            (90..=110).contains(&snapshot.total_executions),
            "expected ~100 executions, got {}",
            snapshot.total_executions
        );
        assert_eq!(snapshot.success_rate(), 100.0);
        assert_eq!(engine.collector().engine_state(), EngineState::Stopped);
        assert_eq!(
            engine.collector().lifecycle_count(LifecycleEvent::Complete),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tps_run_terminates_with_zero_executions() {
        let engine = engine_for(Arc::new(OkTask), 0.0, 1);
        let snapshot = engine.run().await.unwrap();
        assert_eq!(snapshot.total_executions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_failure_propagates_and_skips_teardown() {
        let probe = LifecycleProbe::new(true);
        let engine = engine_for(probe.clone(), 10.0, 1);
        let err = engine.run().await.expect_err("init must fail the run");
        assert!(matches!(err, EngineError::Init { .. }));
        assert!(err.metrics().is_none());
        assert_eq!(probe.inits.load(Ordering::Relaxed), 1);
        assert_eq!(probe.teardowns.load(Ordering::Relaxed), 0);
        assert_eq!(engine.collector().total_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_once_after_successful_init() {
        let probe = LifecycleProbe::new(false);
        let engine = engine_for(probe.clone(), 20.0, 1);
        engine.run().await.unwrap();
        assert_eq!(probe.inits.load(Ordering::Relaxed), 1);
        assert_eq!(probe.teardowns.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_run_early() {
        let engine = Arc::new(engine_for(Arc::new(OkTask), 1_000.0, 10));
        let runner = Arc::clone(&engine);
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.stop();
        let snapshot = handle.await.unwrap().unwrap();
        assert!(
            snapshot.total_executions < 1_000,
            "stop at 200ms must cut the run short, got {}",
            snapshot.total_executions
        );
        assert_eq!(engine.collector().lifecycle_count(LifecycleEvent::Stop), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_platform_slot_serializes_iterations() {
        let probe = ConcurrencyProbe::new();
        let execution = ExecutionConfig {
            platform_thread_pool_size: 1,
            ..ExecutionConfig::default()
        };
        let engine = engine_for(probe.clone(), 100.0, 1).with_execution_config(execution);
        engine.run().await.unwrap();
        assert_eq!(
            probe.peak.load(Ordering::SeqCst),
            1,
            "pool of one must fully serialize executions"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_handler_counts_rejections() {
        let probe = ConcurrencyProbe::new();
        let execution = ExecutionConfig {
            platform_thread_pool_size: 1,
            ..ExecutionConfig::default()
        };
        let engine = engine_for(probe, 100.0, 1)
            .with_execution_config(execution)
            .with_backpressure(BackpressureHandler::Reject);
        let snapshot = engine.run().await.unwrap();
        assert!(
            snapshot.rejected_count > 0,
            "a 100 tps rate against a pool of one must reject"
        );
        assert_eq!(snapshot.dropped_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected_before_init() {
        let probe = LifecycleProbe::new(false);
        let execution = ExecutionConfig {
            drain_timeout: Duration::from_secs(2),
            force_timeout: Duration::from_secs(1),
            ..ExecutionConfig::default()
        };
        let engine = engine_for(probe.clone(), 10.0, 1).with_execution_config(execution);
        let err = engine.run().await.expect_err("invalid config");
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(probe.inits.load(Ordering::Relaxed), 0, "init must not run");
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_run_id_beats_collector_tag() {
        let collector = Arc::new(MetricsCollector::with_defaults().with_run_id("from-collector"));
        let engine = ExecutionEngine::new(
            Arc::new(OkTask),
            Arc::new(StaticLoad::new(1.0, Duration::from_millis(100))),
            collector,
        )
        .with_run_id("explicit");
        assert_eq!(engine.resolve_run_id(), "explicit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_tag_beats_generated() {
        let collector = Arc::new(MetricsCollector::with_defaults().with_run_id("from-collector"));
        let engine = ExecutionEngine::new(
            Arc::new(OkTask),
            Arc::new(StaticLoad::new(1.0, Duration::from_millis(100))),
            collector,
        );
        assert_eq!(engine.resolve_run_id(), "from-collector");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let engine = engine_for(Arc::new(OkTask), 1.0, 1);
        engine.close();
        engine.close();
        engine.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let engine = engine_for(Arc::new(OkTask), 1.0, 1);
        engine.stop();
        engine.stop();
        let snapshot = engine.run().await.unwrap();
        assert_eq!(snapshot.total_executions, 0, "pre-stopped engine must not submit");
    }
}
