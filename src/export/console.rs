//! Console exporter for development and worker CLIs.

use super::{Exporter, RunContext};
use crate::error::ExportError;
use crate::metrics::{AggregatedMetrics, PercentileMap};
use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write as _;

/// Writes snapshots to stdout, either as a human-readable block or as one
/// JSON object per export for log pipelines.
#[derive(Debug)]
pub struct ConsoleExporter {
    pretty: bool,
}

impl ConsoleExporter {
    /// Human-readable block output.
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// One JSON object per export.
    pub fn json() -> Self {
        Self { pretty: false }
    }

    fn render_pretty(title: &str, metrics: &AggregatedMetrics, context: &RunContext) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== {title} (run {}) ===", context.run_id);
        let _ = writeln!(
            out,
            "executions: {} (success {}, failure {}, {:.1}% ok)",
            metrics.total_executions,
            metrics.success_count,
            metrics.failure_count,
            metrics.success_rate(),
        );
        let _ = writeln!(
            out,
            "throughput: {:.1} tps over {} ms, queue {}",
            metrics.total_tps(),
            metrics.elapsed_millis,
            metrics.queue_size,
        );
        if metrics.dropped_count > 0 || metrics.rejected_count > 0 {
            let _ = writeln!(
                out,
                "backpressure: {} dropped, {} rejected",
                metrics.dropped_count, metrics.rejected_count,
            );
        }
        Self::render_percentile_line(&mut out, "success", &metrics.success_percentiles);
        Self::render_percentile_line(&mut out, "failure", &metrics.failure_percentiles);
        Self::render_percentile_line(&mut out, "queue-wait", &metrics.queue_wait_percentiles);
        if let Some(stats) = &metrics.success_stats {
            let _ = writeln!(
                out,
                "success latency: mean {:.2} ms, stddev {:.2} ms, min {:.2} ms, max {:.2} ms",
                stats.mean / 1e6,
                stats.std_dev / 1e6,
                stats.min as f64 / 1e6,
                stats.max as f64 / 1e6,
            );
        }
        out
    }

    fn render_percentile_line(out: &mut String, label: &str, percentiles: &PercentileMap) {
        if percentiles.is_empty() {
            return;
        }
        let rendered: Vec<String> = percentiles
            .iter()
            .map(|(q, nanos)| format!("{q}={:.2}ms", *nanos as f64 / 1e6))
            .collect();
        let _ = writeln!(out, "{label} latency: {}", rendered.join(" "));
    }

    fn render_json(title: &str, metrics: &AggregatedMetrics, context: &RunContext) -> String {
        let percentiles = |map: &PercentileMap| {
            map.iter()
                .map(|(q, nanos)| (q.to_string(), json!(nanos)))
                .collect::<serde_json::Map<_, _>>()
        };
        json!({
            "title": title,
            "run_id": context.run_id,
            "resource": context.normalized_attributes(),
            "total_executions": metrics.total_executions,
            "success_count": metrics.success_count,
            "failure_count": metrics.failure_count,
            "success_rate": metrics.success_rate(),
            "elapsed_millis": metrics.elapsed_millis,
            "total_tps": metrics.total_tps(),
            "queue_size": metrics.queue_size,
            "dropped": metrics.dropped_count,
            "rejected": metrics.rejected_count,
            "success_percentiles_nanos": percentiles(&metrics.success_percentiles),
            "failure_percentiles_nanos": percentiles(&metrics.failure_percentiles),
            "queue_wait_percentiles_nanos": percentiles(&metrics.queue_wait_percentiles),
        })
        .to_string()
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exporter for ConsoleExporter {
    async fn export(
        &self,
        title: &str,
        metrics: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError> {
        let rendered = if self.pretty {
            Self::render_pretty(title, metrics, context)
        } else {
            Self::render_json(title, metrics, context)
        };
        println!("{rendered}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
