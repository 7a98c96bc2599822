// src/core/kv/mod.rs

//! The key-value store client used by handlers for session-like state.
//!
//! Every call is synchronous and infallible at the API level: a transport or
//! protocol failure is reported as `false` from `set` and `None` from `get`,
//! meaning "state not persisted", never as an error escaping to the handler.

mod error;
mod memory;
mod resp_store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use resp_store::RespStore;

use crate::config::StoreConfig;
use std::sync::Arc;
use tracing::info;

/// The minimal get/set contract of the external store.
pub trait KeyValueStore: Send + Sync {
    /// Stores `value` under `key`. Returns `false` if the value was not persisted.
    fn set(&self, key: &str, value: &str) -> bool;

    /// Fetches the value under `key`. Returns `None` when the key is absent or
    /// the store could not be reached.
    fn get(&self, key: &str) -> Option<String>;
}

/// Builds the process-wide store client described by the configuration.
/// Called once at startup, before the server begins accepting.
pub fn open(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    if config.enabled {
        Arc::new(RespStore::connect(config.clone()))
    } else {
        info!("External store disabled; using the in-process store.");
        Arc::new(MemoryStore::new())
    }
}
