//! Adapter/plugin host (C14): the process-wide registry of connectors the
//! composite provider and failover router pull their working sets from, per
//! `SPEC_FULL.md` §4.13.
//!
//! A static registry, not a reflection-based loader: callers construct
//! connectors (optionally wrapped in middleware via `ConnectorBuilder`) and
//! `register` them explicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ingest_core::IngestConnector;
use ingest_types::{Capability, IngestError};

/// Owns the set of connectors this process knows about, keyed by provider key.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: Mutex<HashMap<String, Arc<dyn IngestConnector>>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connector` under its descriptor's key.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidMiddlewareStack`] if a connector is
    /// already registered under the same key.
    pub fn register(&self, connector: Arc<dyn IngestConnector>) -> Result<(), IngestError> {
        let key = connector.descriptor().key;
        let mut guard = self.connectors.lock().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&key) {
            return Err(IngestError::InvalidMiddlewareStack {
                message: format!("provider key '{key}' is already registered"),
            });
        }
        guard.insert(key, connector);
        Ok(())
    }

    /// Remove a connector, e.g. on credential revocation. A no-op if `key`
    /// was never registered.
    pub fn unregister(&self, key: &str) {
        self.connectors.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    /// Look up a connector by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn IngestConnector>> {
        self.connectors.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    /// All registered connectors, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn IngestConnector>> {
        self.connectors.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }

    /// Connectors advertising `capability`, used to build the composite
    /// provider's and failover router's candidate lists.
    #[must_use]
    pub fn by_capability(&self, capability: Capability) -> Vec<Arc<dyn IngestConnector>> {
        self.connectors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|c| c.supports(capability))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_mock::DynamicMockConnector;

    #[test]
    fn register_rejects_duplicate_keys() {
        let registry = ConnectorRegistry::new();
        let (a, _) = DynamicMockConnector::new_with_controller("alpha");
        let (b, _) = DynamicMockConnector::new_with_controller("alpha");
        registry.register(a).unwrap();
        assert!(registry.register(b).is_err());
    }

    #[test]
    fn by_capability_filters_to_matching_connectors() {
        let registry = ConnectorRegistry::new();
        let (a, _) = DynamicMockConnector::new_with_controller("alpha");
        registry.register(a).unwrap();
        assert_eq!(registry.by_capability(Capability::History).len(), 1);
        assert_eq!(registry.by_capability(Capability::Streaming).len(), 1);
    }

    #[test]
    fn unregister_then_get_returns_none() {
        let registry = ConnectorRegistry::new();
        let (a, _) = DynamicMockConnector::new_with_controller("alpha");
        registry.register(a).unwrap();
        registry.unregister("alpha");
        assert!(registry.get("alpha").is_none());
    }
}
