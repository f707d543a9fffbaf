//! Explicit stage registration.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::Stage;

/// Maps stage ids to their implementations.
#[derive(Debug, Default)]
pub struct StageRegistry {
    stages: DashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `stage` under its own id, returning any replaced stage.
    pub fn register(&self, stage: impl Stage + 'static) -> Option<Arc<dyn Stage>> {
        self.register_arc(Arc::new(stage))
    }

    /// Registers a shared stage under its own id.
    pub fn register_arc(&self, stage: Arc<dyn Stage>) -> Option<Arc<dyn Stage>> {
        let id = stage.id().to_string();
        debug!(stage_id = %id, "Registering stage");
        self.stages.insert(id, stage)
    }

    /// Builder form of [`StageRegistry::register`].
    #[must_use]
    pub fn with(self, stage: impl Stage + 'static) -> Self {
        self.register(stage);
        self
    }

    /// Looks up a stage.
    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(stage_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns true if a stage is registered under `stage_id`.
    #[must_use]
    pub fn contains(&self, stage_id: &str) -> bool {
        self.stages.contains_key(stage_id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stages.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Unregisters a stage.
    pub fn remove(&self, stage_id: &str) -> Option<Arc<dyn Stage>> {
        self.stages.remove(stage_id).map(|(_, stage)| stage)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, StageError};
    use serde_json::{json, Value};

    fn echo(id: &str) -> impl Stage {
        FnStage::new(id, |input: Value| async move { Ok::<_, StageError>(input) })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = StageRegistry::new().with(echo("b")).with(echo("a"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.get("a").map(|s| s.id().to_string()), Some("a".to_string()));
    }

    #[test]
    fn test_register_replaces_and_remove() {
        let registry = StageRegistry::new();
        assert!(registry.register(echo("a")).is_none());
        assert!(registry.register(echo("a")).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("a").is_some());
        assert!(registry.is_empty());
        assert!(registry.get("a").is_none());
    }

    #[tokio::test]
    async fn test_shared_stage_invocation() {
        let registry = Arc::new(StageRegistry::new().with(echo("echo")));
        let stage = registry.get("echo").unwrap();
        assert_eq!(stage.invoke(json!({"x": 1})).await.unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_invoke_from_sync_code() {
        let registry = StageRegistry::new().with(echo("echo"));
        let stage = registry.get("echo").unwrap();
        let output = tokio_test::block_on(stage.invoke(json!("ping"))).unwrap();
        assert_eq!(output, json!("ping"));
    }
}
