use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

/// Key/value store shared by every hook invocation of a proxy session.
///
/// Cloning yields another handle to the same store. Entries live until they
/// are overwritten, removed or the session ends; nothing is evicted and keys
/// are not namespaced, so hooks that share a key share its value.
///
/// Each method call is atomic. A sequence of calls is not: two hooks doing
/// `get`, then `.await`, then `set` on the same key can interleave at the
/// await and lose an update. Use [`update`](Self::update) when the new value
/// depends on the old one.
#[derive(Clone, Default)]
pub struct SharedState {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("len", &self.len())
            .finish()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic inside an `update` closure cannot leave a half-written entry,
    // so a poisoned lock still guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Atomically replace the value under `key` with `f(current)`.
    ///
    /// Returning `None` removes the key. No other access to the store can
    /// happen while `f` runs, so `f` must not block.
    pub fn update<F>(&self, key: &str, f: F) -> Option<Value>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let mut entries = self.lock();
        match f(entries.get(key)) {
            Some(value) => {
                entries.insert(key.to_string(), value.clone());
                Some(value)
            }
            None => {
                entries.remove(key);
                None
            }
        }
    }

    /// Current keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the whole store as a JSON object.
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
