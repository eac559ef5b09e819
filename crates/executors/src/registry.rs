//! Maps `task_type` strings onto executor implementations.
//!
//! The registry is assembled once at startup and shared read-only by every
//! run executor afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin::{NoopExecutor, ShellExecutor};
use crate::TaskExecutor;

#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the `noop` and `shell` executors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NoopExecutor::TASK_TYPE, Arc::new(NoopExecutor));
        registry.register(ShellExecutor::TASK_TYPE, Arc::new(ShellExecutor::default()));
        registry
    }

    /// Register `executor` under `task_type`, replacing any previous entry.
    pub fn register(&mut self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(task_type.into(), executor);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.executors.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;

    #[test]
    fn builtins_are_registered() {
        let registry = ExecutorRegistry::with_builtins();
        assert_eq!(registry.task_types(), vec!["noop", "shell"]);
        assert!(registry.get("noop").is_some());
        assert!(registry.get("training").is_none());
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut registry = ExecutorRegistry::with_builtins();
        registry.register("noop", Arc::new(MockExecutor::succeeding("noop")));
        assert_eq!(registry.task_types().len(), 2);
        assert!(registry.contains("noop"));
    }
}
