//! Per-iteration execution wrapper.
//!
//! [`TaskExecutor`] times a single `task.execute(iteration)` call, converts
//! panics into `Failure` results, and optionally wraps the call in a tracing
//! span. The hot path does no I/O and allocates nothing proportional to the
//! work performed.

use crate::error::TaskError;
use crate::metrics::ExecutionMetrics;
use crate::task::{Task, TaskResult};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Wraps task execution with timing, panic capture, and optional spans.
///
/// One executor serves a whole run; it is cheap to clone into worker tasks.
#[derive(Clone)]
pub struct TaskExecutor {
    task: Arc<dyn Task>,
    epoch: Instant,
    run_id: Arc<str>,
    /// Every Nth iteration gets a span; 0 disables tracing entirely.
    span_stride: u64,
    span_counter: Arc<AtomicU64>,
}

impl TaskExecutor {
    /// Creates an executor with tracing disabled.
    ///
    /// `epoch` is the run's monotonic zero; all record timestamps are
    /// nanoseconds since it.
    pub fn new(task: Arc<dyn Task>, run_id: impl Into<Arc<str>>, epoch: Instant) -> Self {
        Self {
            task,
            epoch,
            run_id: run_id.into(),
            span_stride: 0,
            span_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enables iteration spans with head-based sampling.
    ///
    /// The sample rate is converted to a deterministic stride (every Nth
    /// iteration is spanned) so sampling stays evenly distributed across
    /// workers without shared randomness.
    pub fn with_tracing(mut self, enabled: bool, sample_rate: f64) -> Self {
        self.span_stride = if !enabled || sample_rate <= 0.0 {
            0
        } else if sample_rate >= 1.0 {
            1
        } else {
            (1.0 / sample_rate).round() as u64
        };
        self
    }

    /// Nanoseconds since the run epoch.
    pub fn monotonic_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn should_trace(&self) -> bool {
        match self.span_stride {
            0 => false,
            1 => true,
            stride => self.span_counter.fetch_add(1, Ordering::Relaxed) % stride == 0,
        }
    }

    /// Runs one iteration and produces its [`ExecutionMetrics`] record.
    ///
    /// A panic inside `task.execute` is caught and synthesized into a
    /// `Failure`; the run continues.
    pub async fn execute_with_metrics(&self, iteration: u64) -> ExecutionMetrics {
        let start = self.monotonic_nanos();

        let result = if self.should_trace() {
            let span = tracing::info_span!(
                "iteration",
                run_id = %self.run_id,
                iteration,
                status = tracing::field::Empty,
            );
            let outcome = AssertUnwindSafe(self.task.execute(iteration))
                .catch_unwind()
                .instrument(span.clone())
                .await;
            let result = unwrap_outcome(outcome);
            match &result {
                TaskResult::Success { .. } => {
                    span.record("status", "success");
                }
                TaskResult::Failure { error } => {
                    span.record("status", "failure");
                    tracing::debug!(parent: &span, error = %error, "iteration failed");
                }
            }
            result
        } else {
            unwrap_outcome(
                AssertUnwindSafe(self.task.execute(iteration))
                    .catch_unwind()
                    .await,
            )
        };

        let end = self.monotonic_nanos();
        ExecutionMetrics::new(start, end, result, iteration)
    }
}

fn unwrap_outcome(
    outcome: Result<TaskResult, Box<dyn std::any::Any + Send>>,
) -> TaskResult {
    match outcome {
        Ok(result) => result,
        Err(panic) => TaskResult::failure(TaskError::Panic {
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SleepyTask(Duration);

    #[async_trait]
    impl Task for SleepyTask {
        async fn execute(&self, _iteration: u64) -> TaskResult {
            tokio::time::sleep(self.0).await;
            TaskResult::success()
        }
    }

    struct PanickyTask;

    #[async_trait]
    impl Task for PanickyTask {
        async fn execute(&self, iteration: u64) -> TaskResult {
            if iteration % 2 == 0 {
                panic!("even iterations explode");
            }
            TaskResult::success()
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        async fn execute(&self, _iteration: u64) -> TaskResult {
            TaskResult::failure(TaskError::Io {
                message: "connection reset".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_metrics_capture_duration_and_iteration() {
        let executor = TaskExecutor::new(
            Arc::new(SleepyTask(Duration::from_millis(20))),
            "run-1",
            Instant::now(),
        );
        let metrics = executor.execute_with_metrics(7).await;
        assert_eq!(metrics.iteration(), 7);
        assert!(metrics.is_success());
        assert!(metrics.end_nanos() >= metrics.start_nanos());
        assert!(
            metrics.duration_nanos() >= 10_000_000,
            "expected >=10ms, got {}ns",
            metrics.duration_nanos()
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_result() {
        let executor = TaskExecutor::new(Arc::new(PanickyTask), "run-1", Instant::now());
        let metrics = executor.execute_with_metrics(0).await;
        match metrics.result() {
            TaskResult::Failure {
                error: TaskError::Panic { message },
            } => {
                assert!(message.contains("explode"), "got: {message}");
            }
            other => panic!("expected panic failure, got {other:?}"),
        }

        // Odd iterations still succeed on the same executor.
        assert!(executor.execute_with_metrics(1).await.is_success());
    }

    #[tokio::test]
    async fn test_failure_results_pass_through() {
        let executor = TaskExecutor::new(Arc::new(FailingTask), "run-1", Instant::now());
        let metrics = executor.execute_with_metrics(3).await;
        assert!(!metrics.is_success());
        assert_eq!(
            metrics.result().error().map(TaskError::error_category),
            Some("io")
        );
    }

    #[tokio::test]
    async fn test_tracing_enabled_does_not_change_results() {
        let executor = TaskExecutor::new(Arc::new(FailingTask), "run-1", Instant::now())
            .with_tracing(true, 1.0);
        let metrics = executor.execute_with_metrics(0).await;
        assert!(!metrics.is_success());
    }

    #[test]
    fn test_span_stride_from_sample_rate() {
        let task: Arc<dyn Task> = Arc::new(FailingTask);
        let off = TaskExecutor::new(task.clone(), "r", Instant::now()).with_tracing(false, 1.0);
        assert_eq!(off.span_stride, 0);
        let always = TaskExecutor::new(task.clone(), "r", Instant::now()).with_tracing(true, 1.0);
        assert_eq!(always.span_stride, 1);
        let sampled = TaskExecutor::new(task, "r", Instant::now()).with_tracing(true, 0.05);
        assert_eq!(sampled.span_stride, 20);
    }
}
