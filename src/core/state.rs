// src/core/state.rs

//! Process-wide state shared by the reactor, connection actors and handlers.

use crate::config::Config;
use crate::connection::Connection;
use crate::core::kv::KeyValueStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Simple server-wide counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub total_connections: AtomicU64,
    pub total_commands: AtomicU64,
}

impl ServerStats {
    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_total_commands(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }
}

/// State constructed once at startup and never replaced while serving.
pub struct ServerState {
    pub config: Config,
    /// The key-value store client shared by every handler.
    pub store: Arc<dyn KeyValueStore>,
    /// The live-connection set, keyed by session id.
    pub clients: DashMap<u64, Arc<Connection>>,
    pub stats: ServerStats,
}

impl ServerState {
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            store,
            clients: DashMap::new(),
            stats: ServerStats::default(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
