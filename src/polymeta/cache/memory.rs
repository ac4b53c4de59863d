use super::CacheStore;
use crate::error::Result;
use crate::model::MetaValue;
use std::cell::RefCell;
use std::collections::HashMap;

/// Process-local cache store.
///
/// Uses `RefCell` for interior mutability since callers are single-threaded,
/// matching [`InMemoryStore`](crate::store::InMemoryStore).
#[derive(Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, MetaValue>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<MetaValue>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&self, key: &str, value: MetaValue) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<bool> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }
}
