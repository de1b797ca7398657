//! Keyed registry of shared gates.
//!
//! Each guarded operation needs exactly one gate instance, shared by every caller of that
//! operation. The registry maps an operation key (any string the application picks, typically
//! a qualified method name) to that instance and creates it on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

/// Thread-safe map from operation key to a shared gate. Clones share the same map.
pub struct GateRegistry<G> {
    inner: Arc<RwLock<HashMap<String, Arc<G>>>>,
}

impl<G> Default for GateRegistry<G> {
    fn default() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<G> Clone for GateRegistry<G> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<G> fmt::Debug for GateRegistry<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateRegistry").field("keys", &self.keys()).finish()
    }
}

impl<G> GateRegistry<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate registered under `key`, creating it with `init` if absent.
    ///
    /// `init` runs at most once per key even when callers race on a missing key.
    pub fn get_or_insert_with<F>(&self, key: &str, init: F) -> Arc<G>
    where
        F: FnOnce() -> G,
    {
        if let Some(gate) = self.get(key) {
            return gate;
        }

        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(key, "gate created");
            Arc::new(init())
        }))
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with). Nothing is stored
    /// when `init` fails.
    pub fn try_get_or_insert_with<F, E>(&self, key: &str, init: F) -> Result<Arc<G>, E>
    where
        F: FnOnce() -> Result<G, E>,
    {
        if let Some(gate) = self.get(key) {
            return Ok(gate);
        }

        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = map.get(key) {
            return Ok(Arc::clone(gate));
        }
        let gate = Arc::new(init()?);
        map.insert(key.to_string(), Arc::clone(&gate));
        tracing::debug!(key, "gate created");
        Ok(gate)
    }

    /// Register `gate` under `key`, returning the gate it replaced.
    ///
    /// Last registration wins. Callers holding the old `Arc` keep using the old gate.
    pub fn register(&self, key: impl Into<String>, gate: G) -> Option<Arc<G>> {
        let key = key.into();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = map.insert(key.clone(), Arc::new(gate));
        if previous.is_some() {
            warn!(key = %key, "gate key replaced; last registration wins");
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<Arc<G>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<G>> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}
