//! Query result store and the read-modify-write cycle used by reconciliation
//!
//! Reconciliation reads the entry for a query, transforms it and writes it
//! back. The cycle is not transactional: two reconciliations racing on the
//! same key are not serialized beyond the store's own per-call locking, so the
//! later write wins.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::types::Variables;
use crate::RelayError;

/// Cache key: query document plus the exact variables it ran with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: String,
    pub variables: String,
}

impl CacheKey {
    pub fn new(query: impl Into<String>, variables: &Variables) -> Self {
        // the map is key-ordered, so the serialization is canonical
        let variables = Value::Object(variables.clone()).to_string();
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// Store of cached query results
pub trait CacheStore: Send + Sync {
    /// Read the cached result for a key
    fn get(&self, key: &CacheKey) -> Option<Value>;

    /// Write the result for a key, replacing any previous value
    fn set(&self, key: &CacheKey, value: Value);
}

impl<C: CacheStore + ?Sized> CacheStore for Arc<C> {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &CacheKey, value: Value) {
        (**self).set(key, value)
    }
}

impl<C: CacheStore + ?Sized> CacheStore for &C {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &CacheKey, value: Value) {
        (**self).set(key, value)
    }
}

/// In-memory result cache
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an entry, returning it if present
    pub fn evict(&self, key: &CacheKey) -> Option<Value> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &CacheKey, value: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value);
    }
}

/// Read the entry for `key`, transform it and write it back.
///
/// A missing entry is a [`RelayError::CacheMiss`] when `strict`, otherwise the
/// update is skipped. Nothing is written when the transform fails.
pub fn update<C, F>(cache: &C, key: &CacheKey, strict: bool, transform: F) -> crate::Result<()>
where
    C: CacheStore + ?Sized,
    F: FnOnce(Value) -> crate::Result<Value>,
{
    let Some(previous) = cache.get(key) else {
        if strict {
            return Err(RelayError::CacheMiss(key.query.clone()));
        }
        debug!(query = %key.query, variables = %key.variables, "no cached result, skipping update");
        return Ok(());
    };

    let next = transform(previous)?;
    cache.set(key, next);
    Ok(())
}
