//! Process-wide key/value store shared across handlers and requests.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type AnyValue = Arc<dyn Any + Send + Sync>;

/// A typed key/value store guarded by a single reader/writer lock.
///
/// Reads run concurrently with other reads; writes are exclusive, so a read
/// never observes a partially written value. The lock itself is never
/// exposed. Cloning yields another handle to the same underlying map.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<HashMap<String, AnyValue>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.inner.write().unwrap().insert(key.into(), Arc::new(value));
    }

    /// Returns the value stored under `key`, or `None` if the key is absent
    /// or holds a value of a different type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let guard = self.inner.read().unwrap();
        let value = guard.get(key)?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<AnyValue> {
        self.inner.write().unwrap().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().unwrap().contains_key(key)
    }
}
