// src/core/kv/memory.rs

use super::KeyValueStore;
use dashmap::DashMap;

/// An in-process store, used when no external store is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> bool {
        self.entries.insert(key.to_string(), value.to_string());
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}
