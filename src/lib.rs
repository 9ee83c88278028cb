#![warn(missing_docs)]

//! VajraPulse: a rate-controlled load-testing engine.
//!
//! The crate drives user-supplied work ([`Task`]) at a time-varying target
//! transaction rate ([`LoadPattern`]), measures every iteration, and
//! aggregates results into live and final [`AggregatedMetrics`] snapshots.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vajrapulse::{
//!     ConsoleExporter, MetricsPipeline, StaticLoad, Task, TaskResult,
//! };
//!
//! struct PingTask;
//!
//! #[async_trait::async_trait]
//! impl Task for PingTask {
//!     async fn execute(&self, _iteration: u64) -> TaskResult {
//!         // Call the system under test here.
//!         TaskResult::success()
//!     }
//! }
//!
//! # async fn run() -> Result<(), vajrapulse::EngineError> {
//! let report = MetricsPipeline::new()
//!     .add_exporter(Arc::new(ConsoleExporter::new()))
//!     .with_report_interval(Duration::from_secs(10))
//!     .run(
//!         Arc::new(PingTask),
//!         Arc::new(StaticLoad::new(100.0, Duration::from_secs(30))),
//!     )
//!     .await?;
//! println!("success rate: {:.1}%", report.success_rate());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`task`] - the task lifecycle contract (`init`/`execute(n)`/`teardown`)
//! - [`pattern`] - load patterns, from [`StaticLoad`] to the feedback-driven
//!   [`AdaptivePattern`]
//! - [`rate`] - the rate controller pacing the coordinator loop
//! - [`executor`] - per-iteration timing, panic capture, tracing spans
//! - [`metrics`] - the collector, snapshots, and the periodic reporter
//! - [`engine`] - the composition root driving one run
//! - [`pipeline`] - scoped ownership of collector + reporter + exporters
//! - [`export`] - the exporter contract and baseline sinks
//! - [`shutdown`] - graceful drain, forced termination, signal handling
//! - [`config`] - YAML/JSON configuration with env overrides
//! - [`registry`] - explicit name-to-factory task resolution

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod export;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod rate;
pub mod registry;
pub mod shutdown;
pub mod task;

// Re-exports for ergonomic access
pub use config::{
    parse_duration, ExecutionConfig, ObservabilityConfig, ThreadPoolStrategy, VajraPulseConfig,
};
pub use engine::{BackpressureHandler, ExecutionEngine};
pub use error::{
    CallbackFailure, ConfigError, EngineError, ExportError, RegistryError, ShutdownError,
    TaskError,
};
pub use executor::TaskExecutor;
pub use export::{CompositeExporter, ConsoleExporter, Exporter, NullExporter, RunContext};
pub use metrics::{
    AggregatedMetrics, EngineState, ExecutionMetrics, LatencyStats, LifecycleEvent,
    MetricsCollector, PeriodicReporter, Quantile,
};
pub use pattern::{
    AdaptiveConfig, AdaptiveEvent, AdaptivePattern, AdaptivePhase, BackpressureProvider,
    LoadPattern, MetricsProvider, RampUpLoad, RampUpToMaxLoad, SineWaveLoad, SpikeLoad,
    StaticLoad, StepLoad,
};
pub use pipeline::MetricsPipeline;
pub use rate::RateController;
pub use registry::{TaskFactory, TaskRegistry};
pub use shutdown::{ShutdownManager, ShutdownState, SignalHook};
pub use task::{SimpleTask, SimpleTaskAdapter, Task, TaskResult};
