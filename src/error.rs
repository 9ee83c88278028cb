//! Error types for the load-testing engine.
//!
//! Each error family gets its own type so callers can match on the policy
//! the engine applies: [`TaskError`] values are converted into failure
//! metrics and never abort a run, [`ConfigError`] and the `Init` variant of
//! [`EngineError`] abort before the run starts, and [`ShutdownError`]
//! aggregates callback failures observed during teardown.

use crate::metrics::AggregatedMetrics;

/// Failure produced by a single task iteration.
///
/// Each variant represents a distinct error category that the metrics
/// pipeline can count and report separately. Iteration errors are caught by
/// the executor and recorded as `Failure` results; they never abort the run.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// I/O failure inside the task workload.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The iteration exceeded a task-level deadline.
    #[error("Iteration timed out")]
    Timeout,

    /// Application-level failure reported by the task itself.
    #[error("Task failure: {message}")]
    Application { message: String },

    /// The worker was interrupted during forced shutdown.
    #[error("Iteration interrupted by shutdown")]
    Interrupted,

    /// The task panicked; the panic was caught by the executor.
    #[error("Task panicked: {message}")]
    Panic { message: String },
}

impl TaskError {
    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"io"`, `"timeout"`, `"application"`, `"interrupted"`, `"panic"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Timeout => "timeout",
            Self::Application { .. } => "application",
            Self::Interrupted => "interrupted",
            Self::Panic { .. } => "panic",
        }
    }

    /// Builds an application-level error from any displayable value.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }
}

/// Errors that occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },

    /// YAML/JSON parse failure -- the file does not match the expected schema.
    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    /// Semantic validation failure. All offending values are collected into
    /// a single error so the operator can fix everything in one pass.
    #[error("Invalid configuration ({} issue(s)): {}", .issues.len(), .issues.join("; "))]
    Validation { issues: Vec<String> },
}

/// Error raised by an exporter implementation.
///
/// Callers (the periodic reporter and the pipeline) log these and continue;
/// an exporter fault never aborts the run or other exporters.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Writing to the export destination failed.
    #[error("Export I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The snapshot could not be rendered in the exporter's format.
    #[error("Export formatting error: {message}")]
    Format { message: String },

    /// The exporter was already closed.
    #[error("Exporter '{name}' is closed")]
    Closed { name: &'static str },
}

/// A single failed or timed-out shutdown callback.
#[derive(Debug, Clone)]
pub struct CallbackFailure {
    /// Name the callback was registered under.
    pub name: String,
    /// Failure or timeout description.
    pub reason: String,
}

/// Aggregate of shutdown callback failures.
///
/// Raised once after all callbacks have run; individual failures are
/// collected into `suppressed` rather than short-circuiting the remaining
/// callbacks.
#[derive(Debug, thiserror::Error)]
#[error("{} shutdown callback(s) failed: {}", .suppressed.len(),
    .suppressed.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "))]
pub struct ShutdownError {
    /// Every callback failure observed, in registration order.
    pub suppressed: Vec<CallbackFailure>,
}

/// Error resolving a task name through the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No factory is registered under the requested name.
    #[error("Unknown task '{name}'; available: {}", .available.join(", "))]
    UnknownTask {
        name: String,
        available: Vec<String>,
    },
}

/// Top-level error returned by [`ExecutionEngine::run`](crate::engine::ExecutionEngine::run)
/// and [`MetricsPipeline::run`](crate::pipeline::MetricsPipeline::run).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `task.init()` failed. The engine does not run and teardown is not
    /// called; no metrics are recorded.
    #[error("Task initialization failed: {source}")]
    Init { source: TaskError },

    /// Configuration was rejected before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// One or more shutdown callbacks failed. The run itself completed and
    /// the final metrics snapshot is attached.
    #[error("Run completed but shutdown failed: {source}")]
    Shutdown {
        source: ShutdownError,
        /// Final snapshot taken after executor termination.
        metrics: Box<AggregatedMetrics>,
    },
}

impl EngineError {
    /// Returns the final metrics snapshot when the run produced one.
    ///
    /// Only init and config errors terminate a run without metrics.
    pub fn metrics(&self) -> Option<&AggregatedMetrics> {
        match self {
            Self::Shutdown { metrics, .. } => Some(metrics),
            Self::Init { .. } | Self::Config(_) => None,
        }
    }
}
