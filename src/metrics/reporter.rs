//! Periodic metrics reporter.
//!
//! A single background task that snapshots the collector on a fixed cadence
//! and hands each snapshot to an exporter under the title `"Live Metrics"`.
//! Exporter faults are logged and never kill the reporter; `stop` is
//! idempotent and waits a bounded grace period for the worker to finish its
//! current export before abandoning it.

use super::collector::MetricsCollector;
use crate::export::{Exporter, RunContext};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Title used for every live export.
const LIVE_TITLE: &str = "Live Metrics";

/// Bounded wait for the worker when stopping.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Background snapshot-and-export loop.
pub struct PeriodicReporter {
    collector: Arc<MetricsCollector>,
    exporter: Arc<dyn Exporter>,
    context: Arc<RunContext>,
    interval: Duration,
    export_immediately: bool,
    stop_grace: Duration,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicReporter {
    /// Creates a reporter exporting every `interval`.
    pub fn new(
        collector: Arc<MetricsCollector>,
        exporter: Arc<dyn Exporter>,
        context: Arc<RunContext>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            exporter,
            context,
            interval,
            export_immediately: false,
            stop_grace: DEFAULT_STOP_GRACE,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Fires one export immediately on `start` before the first sleep.
    pub fn with_immediate_export(mut self, immediate: bool) -> Self {
        self.export_immediately = immediate;
        self
    }

    /// Overrides the bounded grace period `stop` waits for the worker.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Spawns the background worker. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let collector = Arc::clone(&self.collector);
        let exporter = Arc::clone(&self.exporter);
        let context = Arc::clone(&self.context);
        let interval = self.interval;
        let immediate = self.export_immediately;
        let cancel = self.cancel.clone();

        *worker = Some(tokio::spawn(async move {
            if immediate {
                export_once(&collector, &exporter, &context).await;
            }
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        export_once(&collector, &exporter, &context).await;
                    }
                    () = cancel.cancelled() => {
                        debug!("periodic reporter stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Stops the worker. Idempotent; waits up to the grace period for the
    /// in-flight export, then abandons the worker.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.stop_grace, handle).await.is_err() {
                warn!(
                    grace_secs = self.stop_grace.as_secs(),
                    "periodic reporter did not stop within grace period; abandoning"
                );
            }
        }
    }

    /// Returns `true` while the worker is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

async fn export_once(
    collector: &MetricsCollector,
    exporter: &Arc<dyn Exporter>,
    context: &RunContext,
) {
    let snapshot = collector.snapshot();
    if let Err(error) = exporter.export(LIVE_TITLE, &snapshot, context).await {
        // The reporter outlives exporter faults; log and keep the cadence.
        warn!(exporter = exporter.name(), %error, "live export failed");
    }
}
