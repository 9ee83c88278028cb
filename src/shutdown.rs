//! Graceful shutdown orchestration.
//!
//! [`ShutdownManager`] owns the one-way state machine
//! `Running -> ShuttingDown -> Terminated`. The first caller of
//! [`initiate_shutdown`](ShutdownManager::initiate_shutdown) wins; drain
//! waits up to `drain_timeout` for in-flight iterations, the forced phase
//! cancels workers and runs until `force_timeout` measured from shutdown
//! initiation, and registered callbacks then run with a per-callback
//! timeout. Callback failures are collected, counted, and raised once as a
//! single [`ShutdownError`] after every callback has had its chance.

use crate::error::{CallbackFailure, ShutdownError};
use crate::metrics::MetricsCollector;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Default per-callback budget.
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Shutdown lifecycle state. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    /// Accepting work.
    Running = 0,
    /// Draining; no new submissions.
    ShuttingDown = 1,
    /// Workers gone, callbacks done.
    Terminated = 2,
}

type CallbackFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

struct ShutdownCallback {
    name: String,
    callback: CallbackFn,
}

/// Orchestrates graceful drain and forced termination.
///
/// The callback list is read-only after construction; state flags are
/// atomic, so the manager can be shared freely across tasks.
pub struct ShutdownManager {
    state: AtomicU8,
    drain_timeout: Duration,
    force_timeout: Duration,
    callback_timeout: Duration,
    callbacks: Vec<ShutdownCallback>,
    force: CancellationToken,
}

impl ShutdownManager {
    /// Creates a manager with the given drain and force budgets.
    ///
    /// `force_timeout` is measured from shutdown initiation and must be at
    /// least `drain_timeout`; config validation enforces this before the
    /// engine constructs a manager.
    pub fn new(drain_timeout: Duration, force_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            drain_timeout,
            force_timeout,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            callbacks: Vec::new(),
            force: CancellationToken::new(),
        }
    }

    /// Overrides the per-callback timeout.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Registers a shutdown callback. Callbacks run in registration order
    /// after workers have terminated.
    pub fn with_callback<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static,
    {
        self.callbacks.push(ShutdownCallback {
            name: name.into(),
            callback: Box::new(callback),
        });
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            1 => ShutdownState::ShuttingDown,
            2 => ShutdownState::Terminated,
            _ => ShutdownState::Running,
        }
    }

    /// Requests shutdown. The first caller performs the transition and gets
    /// `true`; every later caller gets `false`.
    pub fn initiate_shutdown(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            info!("shutdown initiated");
        }
        won
    }

    /// Token cancelled when the forced phase begins; workers race their
    /// iteration against it.
    pub fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    /// Drains the tracker, forces stragglers, then runs callbacks.
    ///
    /// The final metrics snapshot must be taken after this returns: worker
    /// termination happens inside, so no in-flight record is lost.
    pub async fn await_shutdown(
        &self,
        tracker: &TaskTracker,
        collector: &MetricsCollector,
    ) -> Result<(), ShutdownError> {
        let started = Instant::now();
        tracker.close();

        if timeout(self.drain_timeout, tracker.wait()).await.is_err() {
            warn!(
                drain_ms = self.drain_timeout.as_millis() as u64,
                "drain timeout exceeded; interrupting workers"
            );
            self.force.cancel();
            let remaining = self.force_timeout.saturating_sub(started.elapsed());
            if timeout(remaining, tracker.wait()).await.is_err() {
                warn!(
                    force_ms = self.force_timeout.as_millis() as u64,
                    "force timeout exceeded; abandoning remaining workers"
                );
            }
        } else {
            debug!("drain completed within budget");
        }

        let mut failures = Vec::new();
        for entry in &self.callbacks {
            match timeout(self.callback_timeout, (entry.callback)()).await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    collector.record_shutdown_callback_failure();
                    failures.push(CallbackFailure {
                        name: entry.name.clone(),
                        reason,
                    });
                }
                Err(_) => {
                    collector.record_shutdown_callback_failure();
                    failures.push(CallbackFailure {
                        name: entry.name.clone(),
                        reason: format!(
                            "timed out after {}ms",
                            self.callback_timeout.as_millis()
                        ),
                    });
                }
            }
        }

        self.state
            .store(ShutdownState::Terminated as u8, Ordering::Release);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { suppressed: failures })
        }
    }

    /// Installs a Ctrl-C hook that initiates shutdown and cancels `stop`.
    ///
    /// The returned [`SignalHook`] removes the hook when dropped or when
    /// [`SignalHook::remove`] is called, so repeated runs in one process do
    /// not accumulate handlers. Pressing Ctrl-C more than once is harmless:
    /// the state transition is compare-and-set.
    pub fn install_signal_hook(manager: &Arc<Self>, stop: CancellationToken) -> SignalHook {
        let guard = CancellationToken::new();
        let hook_guard = guard.clone();
        let manager = Arc::clone(manager);
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("interrupt received; stopping gracefully");
                        manager.initiate_shutdown();
                        stop.cancel();
                    }
                }
                () = hook_guard.cancelled() => {}
            }
        });
        SignalHook { guard }
    }
}

/// Handle to an installed signal hook; removable and self-removing on drop.
#[derive(Debug)]
pub struct SignalHook {
    guard: CancellationToken,
}

impl SignalHook {
    /// Removes the hook. Safe to call multiple times.
    pub fn remove(&self) {
        self.guard.cancel();
    }
}

impl Drop for SignalHook {
    fn drop(&mut self) {
        self.guard.cancel();
    }
}
