//! Fan-out and no-op exporters.

use super::{Exporter, RunContext};
use crate::error::ExportError;
use crate::metrics::AggregatedMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Sends every snapshot to multiple exporters concurrently.
///
/// A failing exporter is logged and does not prevent the others from
/// receiving the snapshot.
pub struct CompositeExporter {
    exporters: Vec<Arc<dyn Exporter>>,
}

impl CompositeExporter {
    /// Creates a composite over the given exporters.
    pub fn new(exporters: Vec<Arc<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    /// Adds an exporter to the fan-out.
    pub fn add(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters.push(exporter);
    }

    /// Number of exporters in the fan-out.
    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    /// Returns `true` when there are no exporters.
    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }
}

impl std::fmt::Debug for CompositeExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeExporter")
            .field("exporter_count", &self.exporters.len())
            .finish()
    }
}

#[async_trait]
impl Exporter for CompositeExporter {
    async fn export(
        &self,
        title: &str,
        metrics: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError> {
        let futures: Vec<_> = self
            .exporters
            .iter()
            .map(|e| e.export(title, metrics, context))
            .collect();
        for (exporter, result) in self.exporters.iter().zip(futures::future::join_all(futures).await)
        {
            if let Err(error) = result {
                warn!(exporter = exporter.name(), %error, "exporter failed");
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ExportError> {
        for exporter in self.exporters.iter().rev() {
            if let Err(error) = exporter.close().await {
                warn!(exporter = exporter.name(), %error, "exporter close failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// Discards every snapshot. Useful as a stand-in during tests.
#[derive(Debug, Default)]
pub struct NullExporter;

impl NullExporter {
    /// Creates a no-op exporter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Exporter for NullExporter {
    async fn export(
        &self,
        _title: &str,
        _metrics: &AggregatedMetrics,
        _context: &RunContext,
    ) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
