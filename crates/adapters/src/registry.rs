//! In-memory adapter registry.

use crate::adapter::AgentAdapter;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps adapter ids to adapter descriptors. Pure in-memory, no I/O; built once
/// at startup and shared read-only after that.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its meta id, replacing any previous entry.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.meta().id.clone(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn AgentAdapter>> {
        let mut all: Vec<_> = self.adapters.values().cloned().collect();
        all.sort_by(|a, b| a.meta().id.cmp(&b.meta().id));
        all
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
