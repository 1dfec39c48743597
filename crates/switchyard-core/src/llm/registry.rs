//! Provider registry for runtime adapter lookup.
//!
//! Built once at startup from the configured provider list. Adapters are held
//! behind `Arc` so that in-flight streams keep their adapter alive across a
//! provider config replace.

use std::collections::HashMap;
use std::sync::Arc;

use super::box_adapter::BoxProviderAdapter;

/// Registry of available provider adapters, indexed by `provider_id`.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<BoxProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its own `provider_id`.
    ///
    /// If an adapter with this id already exists, it is replaced.
    pub fn register(&mut self, adapter: BoxProviderAdapter) {
        self.adapters
            .insert(adapter.provider_id().to_string(), Arc::new(adapter));
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<BoxProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.adapters.contains_key(provider_id)
    }

    /// All registered ids, sorted.
    pub fn list_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
