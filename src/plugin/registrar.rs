// src/plugin/registrar.rs

use crate::connection::Connection;
use crate::core::dispatch::{CommandHandler, CommandTable};
use crate::core::kv::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, info};

/// The server handle given to a plugin during initialization.
///
/// Registrations are staged and only written into the dispatch table once
/// `initialize` has returned, so a plugin that fails halfway leaves no
/// handlers behind.
pub struct Registrar {
    source: String,
    store: Arc<dyn KeyValueStore>,
    staged: Vec<(String, Arc<dyn CommandHandler>)>,
}

impl Registrar {
    pub fn new(source: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            source: source.into(),
            store,
            staged: Vec::new(),
        }
    }

    /// Registers a closure as the handler for `name`.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&Connection, &str) + Send + Sync + 'static,
    {
        self.staged.push((name.to_string(), Arc::new(handler)));
    }

    /// Registers a `CommandHandler` implementation for `name`.
    pub fn register_handler<H>(&mut self, name: &str, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.staged.push((name.to_string(), Arc::new(handler)));
    }

    /// The shared key-value store client, for handlers that persist state.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names staged so far, in registration order.
    pub fn staged_names(&self) -> Vec<&str> {
        self.staged.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Writes the staged handlers into `table` in registration order, later
    /// registrations replacing earlier ones. Returns how many were written.
    pub fn commit(self, table: &mut CommandTable) -> usize {
        let count = self.staged.len();
        for (name, handler) in self.staged {
            if let Some(previous) = table.register_arc(&name, &self.source, handler) {
                info!(
                    "Command '{}' from '{}' replaces the one registered by '{}'.",
                    name, self.source, previous.source
                );
            } else {
                debug!("Registered command '{}' from '{}'.", name, self.source);
            }
        }
        count
    }
}
