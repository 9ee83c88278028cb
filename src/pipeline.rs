//! Scoped metrics pipeline.
//!
//! [`MetricsPipeline`] owns a collector, an optional periodic reporter, and
//! the exporter list for one run. [`run`](MetricsPipeline::run) consumes the
//! pipeline: it builds and drives an [`ExecutionEngine`], stops the reporter
//! before anything else is torn down, exports the final snapshot to every
//! exporter, and closes exporters in reverse registration order. Export and
//! close faults are logged and never abort the remaining work.

use crate::config::{ExecutionConfig, ObservabilityConfig};
use crate::engine::{BackpressureHandler, ExecutionEngine};
use crate::error::EngineError;
use crate::export::{CompositeExporter, Exporter, RunContext};
use crate::metrics::{AggregatedMetrics, MetricsCollector, PeriodicReporter};
use crate::pattern::LoadPattern;
use crate::task::Task;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Title used for the final export.
const FINAL_TITLE: &str = "Final Results";

/// Owns collector, reporter, and exporters as one scoped resource.
pub struct MetricsPipeline {
    collector: Arc<MetricsCollector>,
    exporters: Vec<Arc<dyn Exporter>>,
    report_interval: Option<Duration>,
    execution: ExecutionConfig,
    observability: ObservabilityConfig,
    backpressure: BackpressureHandler,
    run_id: Option<String>,
    resource_attributes: BTreeMap<String, String>,
}

impl MetricsPipeline {
    /// Creates a pipeline around a default collector with no exporters.
    pub fn new() -> Self {
        Self::with_collector(Arc::new(MetricsCollector::with_defaults()))
    }

    /// Creates a pipeline around an injected collector.
    pub fn with_collector(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            exporters: Vec::new(),
            report_interval: None,
            execution: ExecutionConfig::default(),
            observability: ObservabilityConfig::default(),
            backpressure: BackpressureHandler::default(),
            run_id: None,
            resource_attributes: BTreeMap::new(),
        }
    }

    /// Creates a pipeline with a collector configured for the given
    /// percentiles.
    pub fn with_percentiles(quantiles: &[f64]) -> Self {
        Self::with_collector(Arc::new(MetricsCollector::new(quantiles)))
    }

    /// Registers an exporter. Registration order is close order reversed.
    pub fn add_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Enables live export at the given cadence. Live export also requires
    /// `observability.metricsEnabled` (the default).
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Applies execution settings to the engine this pipeline builds.
    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        self.execution = config;
        self
    }

    /// Applies observability settings.
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability = config;
        self
    }

    /// Sets the engine's backpressure policy.
    pub fn with_backpressure(mut self, handler: BackpressureHandler) -> Self {
        self.backpressure = handler;
        self
    }

    /// Sets an explicit run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Adds a resource attribute carried on the [`RunContext`].
    pub fn with_resource_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.resource_attributes.insert(key.into(), value.into());
        self
    }

    /// The shared collector.
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Runs a task under a load pattern, consuming the pipeline.
    ///
    /// The final snapshot is exported to every exporter after the engine
    /// terminates; exporters are then closed in reverse registration order.
    pub async fn run(
        self,
        task: Arc<dyn Task>,
        pattern: Arc<dyn LoadPattern>,
    ) -> Result<AggregatedMetrics, EngineError> {
        let run_id = self
            .run_id
            .clone()
            .or_else(|| self.collector.run_id().map(String::from))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut context = RunContext::new(run_id.clone());
        context.resource_attributes = self.resource_attributes.clone();
        let context = Arc::new(context);

        let engine = ExecutionEngine::new(task, pattern, Arc::clone(&self.collector))
            .with_run_id(run_id)
            .with_execution_config(self.execution.clone())
            .with_observability(self.observability.clone())
            .with_backpressure(self.backpressure);

        let reporter = self.start_reporter(&context);

        let result = engine.run().await;

        // The reporter is stopped before anything else is released so the
        // collector outlives every live export.
        if let Some(reporter) = reporter {
            reporter.stop().await;
        }

        let final_metrics = match &result {
            Ok(metrics) => Some(metrics),
            Err(error) => error.metrics(),
        };
        if let Some(metrics) = final_metrics {
            for exporter in &self.exporters {
                if let Err(error) = exporter.export(FINAL_TITLE, metrics, &context).await {
                    warn!(exporter = exporter.name(), %error, "final export failed");
                }
            }
        }

        for exporter in self.exporters.iter().rev() {
            if let Err(error) = exporter.close().await {
                warn!(exporter = exporter.name(), %error, "exporter close failed");
            }
        }

        engine.close();
        result
    }

    fn start_reporter(&self, context: &Arc<RunContext>) -> Option<PeriodicReporter> {
        let interval = self.report_interval?;
        if !self.observability.metrics_enabled || self.exporters.is_empty() {
            return None;
        }
        let exporter: Arc<dyn Exporter> = if self.exporters.len() == 1 {
            Arc::clone(&self.exporters[0])
        } else {
            Arc::new(CompositeExporter::new(self.exporters.clone()))
        };
        let reporter = PeriodicReporter::new(
            Arc::clone(&self.collector),
            exporter,
            Arc::clone(context),
            interval,
        );
        reporter.start();
        Some(reporter)
    }
}

impl Default for MetricsPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::pattern::StaticLoad;
    use crate::task::TaskResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct OkTask;

    #[async_trait]
    impl Task for OkTask {
        async fn execute(&self, _iteration: u64) -> TaskResult {
            TaskResult::success()
        }
    }

    struct ProbeExporter {
        name: &'static str,
        titles: Mutex<Vec<String>>,
        closes: AtomicU64,
        close_order: Arc<Mutex<Vec<&'static str>>>,
        fail_close: bool,
    }

    impl ProbeExporter {
        fn new(name: &'static str, close_order: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                titles: Mutex::new(Vec::new()),
                closes: AtomicU64::new(0),
                close_order,
                fail_close: false,
            })
        }

        fn failing_close(name: &'static str, close_order: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                titles: Mutex::new(Vec::new()),
                closes: AtomicU64::new(0),
                close_order,
                fail_close: true,
            })
        }
    }

    #[async_trait]
    impl Exporter for ProbeExporter {
        async fn export(
            &self,
            title: &str,
            _metrics: &AggregatedMetrics,
            _context: &RunContext,
        ) -> Result<(), ExportError> {
            self.titles.lock().push(title.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<(), ExportError> {
            self.closes.fetch_add(1, Ordering::Relaxed);
            self.close_order.lock().push(self.name);
            if self.fail_close {
                return Err(ExportError::Format {
                    message: "close failed".to_string(),
                });
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exports_final_snapshot() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let exporter = ProbeExporter::new("probe", order);
        let pipeline = MetricsPipeline::new().add_exporter(exporter.clone());

        let snapshot = pipeline
            .run(
                Arc::new(OkTask),
                Arc::new(StaticLoad::new(20.0, Duration::from_secs(1))),
            )
            .await
            .unwrap();

        assert!(snapshot.total_executions > 0);
        let titles = exporter.titles.lock().clone();
        assert_eq!(titles, vec!["Final Results".to_string()]);
        assert_eq!(exporter.closes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_reporting_precedes_final_export() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let exporter = ProbeExporter::new("probe", order);
        let pipeline = MetricsPipeline::new()
            .add_exporter(exporter.clone())
            .with_report_interval(Duration::from_millis(200));

        pipeline
            .run(
                Arc::new(OkTask),
                Arc::new(StaticLoad::new(20.0, Duration::from_secs(1))),
            )
            .await
            .unwrap();

        let titles = exporter.titles.lock().clone();
        assert!(
            titles.iter().filter(|t| *t == "Live Metrics").count() >= 2,
            "expected live exports, got {titles:?}"
        );
        assert_eq!(titles.last().map(String::as_str), Some("Final Results"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exporters_close_in_reverse_order_despite_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = ProbeExporter::new("first", Arc::clone(&order));
        let second = ProbeExporter::failing_close("second", Arc::clone(&order));
        let third = ProbeExporter::new("third", Arc::clone(&order));
        let pipeline = MetricsPipeline::new()
            .add_exporter(first.clone())
            .add_exporter(second.clone())
            .add_exporter(third.clone());

        pipeline
            .run(
                Arc::new(OkTask),
                Arc::new(StaticLoad::new(5.0, Duration::from_millis(400))),
            )
            .await
            .unwrap();

        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
        assert_eq!(first.closes.load(Ordering::Relaxed), 1, "close runs after a peer fails");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_disabled_suppresses_live_export_only() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let exporter = ProbeExporter::new("probe", order);
        let observability = ObservabilityConfig {
            metrics_enabled: false,
            ..ObservabilityConfig::default()
        };
        let pipeline = MetricsPipeline::new()
            .add_exporter(exporter.clone())
            .with_report_interval(Duration::from_millis(100))
            .with_observability(observability);

        pipeline
            .run(
                Arc::new(OkTask),
                Arc::new(StaticLoad::new(10.0, Duration::from_millis(500))),
            )
            .await
            .unwrap();

        let titles = exporter.titles.lock().clone();
        assert_eq!(titles, vec!["Final Results".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_context_carries_attributes() {
        let pipeline = MetricsPipeline::new()
            .with_run_id("pipeline-run")
            .with_resource_attribute("environment", "ci");
        assert_eq!(pipeline.run_id.as_deref(), Some("pipeline-run"));
        assert_eq!(
            pipeline.resource_attributes.get("environment").map(String::as_str),
            Some("ci")
        );
        // Consumes the pipeline; the engine adopts the explicit run id.
        let result = pipeline
            .run(
                Arc::new(OkTask),
                Arc::new(StaticLoad::new(5.0, Duration::from_millis(200))),
            )
            .await;
        assert!(result.is_ok());
    }
}
