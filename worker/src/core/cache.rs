//! Per-invocation module cache and mock registry.
//!
//! Both maps are created fresh for every invocation and handed to the
//! runner, which owns them from then on. A runner that wants to keep
//! state warm across invocations may hold on to them deliberately; the
//! bootstrap never reuses them.

use std::collections::HashMap;

use serde_json::Value;

/// Strip the query suffix from a module id so variants of the same
/// module share one entry.
fn normalize_module_id(id: &str) -> &str {
    id.split('?').next().unwrap_or(id)
}

/// One cached module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedModule {
    /// Transformed source, when the controller already served it.
    pub source: Option<String>,
    /// Evaluated exports, when the runner executed the module.
    pub exports: Option<Value>,
}

/// Module cache keyed by normalized module id.
#[derive(Debug, Default)]
pub struct ModuleCacheMap {
    entries: HashMap<String, CachedModule>,
}

impl ModuleCacheMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, entry: CachedModule) {
        self.entries.insert(normalize_module_id(id).to_string(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&CachedModule> {
        self.entries.get(normalize_module_id(id))
    }

    /// Drop one entry. Returns whether anything was cached under `id`.
    pub fn invalidate(&mut self, id: &str) -> bool {
        self.entries.remove(normalize_module_id(id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replacement installed for a mocked module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReplacement {
    /// Replace every export with an automatically generated stub.
    Automock,
    /// Serve another module id in place of the original.
    Redirect(String),
}

/// Mock registry keyed by normalized module id.
#[derive(Debug, Default)]
pub struct MockRegistry {
    mocks: HashMap<String, MockReplacement>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, replacement: MockReplacement) {
        self.mocks
            .insert(normalize_module_id(id).to_string(), replacement);
    }

    pub fn resolve(&self, id: &str) -> Option<&MockReplacement> {
        self.mocks.get(normalize_module_id(id))
    }

    /// Remove one mock. Returns whether a mock was registered for `id`.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.mocks.remove(normalize_module_id(id)).is_some()
    }
}
