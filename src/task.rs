//! Task lifecycle contract driven by the execution engine.
//!
//! A [`Task`] is the unit of user-supplied work: `init` runs exactly once
//! before the first iteration, `execute(iteration)` runs concurrently at the
//! pace set by the load pattern, and `teardown` runs exactly once after the
//! last in-flight iteration completes (if and only if `init` succeeded).
//!
//! The legacy [`SimpleTask`] shape (`setup`/`execute()`/`cleanup`) is
//! supported through [`SimpleTaskAdapter`], which ignores the iteration
//! number.

use crate::config::ThreadPoolStrategy;
use crate::error::TaskError;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of a single task iteration. No partial states.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// The iteration succeeded, with an optional opaque payload.
    Success {
        /// Payload carried through to exporters unchanged; the engine never
        /// inspects it.
        payload: Option<serde_json::Value>,
    },
    /// The iteration failed.
    Failure {
        /// Classified failure recorded in the failure histogram.
        error: TaskError,
    },
}

impl TaskResult {
    /// A success with no payload.
    pub fn success() -> Self {
        Self::Success { payload: None }
    }

    /// A success carrying an opaque payload.
    pub fn success_with(payload: serde_json::Value) -> Self {
        Self::Success {
            payload: Some(payload),
        }
    }

    /// A failure with the given classified error.
    pub fn failure(error: TaskError) -> Self {
        Self::Failure { error }
    }

    /// Returns `true` for [`TaskResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the failure error, if any.
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

/// Iteration-aware task lifecycle.
///
/// Implementations must tolerate parallel `execute` calls; the engine holds
/// the task behind an `Arc` and fans iterations out across worker tasks.
/// A panic inside `execute` is caught by the executor and converted into a
/// `Failure` result; it never aborts the run.
#[async_trait]
pub trait Task: Send + Sync {
    /// Called exactly once before any `execute`. An error here propagates
    /// out of the engine and `teardown` is **not** called.
    async fn init(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Executes one iteration. `iteration` numbers are monotonically
    /// increasing in submission order and unique within a run.
    async fn execute(&self, iteration: u64) -> TaskResult;

    /// Called exactly once after all in-flight executions complete, iff
    /// `init` succeeded. Errors are logged and swallowed by the engine.
    async fn teardown(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Worker pool preference for this task.
    ///
    /// Resolution order is task preference, then engine config, then the
    /// default ([`ThreadPoolStrategy::Virtual`]).
    fn thread_preference(&self) -> Option<ThreadPoolStrategy> {
        None
    }
}

/// Legacy task shape without iteration awareness.
///
/// Adapted to [`Task`] by [`SimpleTaskAdapter`]: `setup` maps to `init`,
/// `execute()` maps to `execute(_)` with the iteration number ignored, and
/// `cleanup` maps to `teardown`.
#[async_trait]
pub trait SimpleTask: Send + Sync {
    /// One-time setup, mapped to [`Task::init`].
    async fn setup(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Executes one iteration without the iteration number.
    async fn execute(&self) -> TaskResult;

    /// One-time cleanup, mapped to [`Task::teardown`].
    async fn cleanup(&self) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Adapter exposing a [`SimpleTask`] as an iteration-aware [`Task`].
pub struct SimpleTaskAdapter<T: SimpleTask> {
    inner: Arc<T>,
}

impl<T: SimpleTask> SimpleTaskAdapter<T> {
    /// Wraps a legacy task.
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Wraps an already-shared legacy task.
    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: SimpleTask> Task for SimpleTaskAdapter<T> {
    async fn init(&self) -> Result<(), TaskError> {
        self.inner.setup().await
    }

    async fn execute(&self, _iteration: u64) -> TaskResult {
        self.inner.execute().await
    }

    async fn teardown(&self) -> Result<(), TaskError> {
        self.inner.cleanup().await
    }
}
