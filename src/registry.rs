//! Explicit task registration table.
//!
//! Worker CLIs resolve task names through a [`TaskRegistry`] built at
//! startup; there is no dynamic class loading. Factories produce a fresh
//! task per run so state never leaks between runs.

use crate::error::RegistryError;
use crate::task::Task;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Factory producing a task instance for one run.
pub type TaskFactory = Arc<dyn Fn() -> Arc<dyn Task> + Send + Sync>;

/// Name-to-factory table for task resolution.
#[derive(Default)]
pub struct TaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Task> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Creates a task by name.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Task>, RegistryError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(RegistryError::UnknownTask {
                name: name.to_string(),
                available: self.names(),
            }),
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Returns `true` when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
