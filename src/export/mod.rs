//! Exporter contract and baseline sink implementations.
//!
//! An [`Exporter`] receives [`AggregatedMetrics`] snapshots from two
//! callers: the periodic reporter (live export) and the pipeline (final
//! export). Implementations must be thread-safe and should never let a
//! fault escape to the caller beyond the returned error, which callers log
//! and swallow.
//!
//! Shipped sinks:
//! - [`ConsoleExporter`] - human-readable or JSON-line output
//! - [`CompositeExporter`] - concurrent fan-out to multiple sinks
//! - [`NullExporter`] - discards everything; useful in tests

use crate::error::ExportError;
use crate::metrics::AggregatedMetrics;
use async_trait::async_trait;
use std::collections::BTreeMap;

mod composite;
mod console;

pub use composite::{CompositeExporter, NullExporter};
pub use console::ConsoleExporter;

/// Identification and resource attributes attached to every export call.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Run id correlating all exports of one engine run.
    pub run_id: String,
    /// User-supplied resource attributes, as given.
    pub resource_attributes: BTreeMap<String, String>,
}

impl RunContext {
    /// Creates a context with no resource attributes.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            resource_attributes: BTreeMap::new(),
        }
    }

    /// Adds a resource attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.insert(key.into(), value.into());
        self
    }

    /// Attributes with well-known keys translated to their canonical names:
    /// `environment` becomes `deployment.environment`, `region` becomes
    /// `cloud.region`; everything else passes through unchanged.
    pub fn normalized_attributes(&self) -> BTreeMap<String, String> {
        self.resource_attributes
            .iter()
            .map(|(key, value)| {
                let key = match key.as_str() {
                    "environment" => "deployment.environment".to_string(),
                    "region" => "cloud.region".to_string(),
                    other => other.to_string(),
                };
                (key, value.clone())
            })
            .collect()
    }
}

/// Sink for aggregated metric snapshots.
///
/// `export` is called from the reporter task during a run and once more by
/// the pipeline with the final snapshot; both can happen on different
/// threads, so implementations must be `Send + Sync`.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Exports one snapshot under the given title.
    async fn export(
        &self,
        title: &str,
        metrics: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError>;

    /// Releases any resources held by the exporter. Called once by the
    /// pipeline, in reverse registration order; errors are logged and do
    /// not abort other closes.
    async fn close(&self) -> Result<(), ExportError> {
        Ok(())
    }

    /// Exporter name for diagnostics.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_normalization() {
        let context = RunContext::new("run-1")
            .with_attribute("environment", "staging")
            .with_attribute("region", "eu-west-1")
            .with_attribute("team", "perf");

        let attrs = context.normalized_attributes();
        assert_eq!(attrs.get("deployment.environment").map(String::as_str), Some("staging"));
        assert_eq!(attrs.get("cloud.region").map(String::as_str), Some("eu-west-1"));
        assert_eq!(attrs.get("team").map(String::as_str), Some("perf"));
        assert!(!attrs.contains_key("environment"));
        assert!(!attrs.contains_key("region"));
    }

    #[test]
    fn test_raw_attributes_preserved() {
        let context = RunContext::new("run-1").with_attribute("environment", "prod");
        assert_eq!(
            context.resource_attributes.get("environment").map(String::as_str),
            Some("prod")
        );
    }
}
