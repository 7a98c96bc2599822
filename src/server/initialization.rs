// src/server/initialization.rs

//! Handles the complete server initialization process: binding the listener,
//! opening the store, and building the dispatch table from built-ins and plugins.

use super::context::ServerContext;
use super::metrics_server;
use crate::config::Config;
use crate::core::dispatch::CommandTable;
use crate::core::handlers;
use crate::core::kv::{self, KeyValueStore};
use crate::core::state::ServerState;
use crate::plugin::{self, Plugin};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Initializes all server components before starting the main loop.
///
/// `store` overrides the store described by the configuration. Statically
/// linked plugins are installed after the dynamically loaded ones.
pub async fn setup(
    config: Config,
    store: Option<Arc<dyn KeyValueStore>>,
    static_plugins: Vec<Box<dyn Plugin>>,
) -> Result<ServerContext> {
    config.validate()?;
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    // The only fatal condition at startup.
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;

    let store = match store {
        Some(store) => store,
        None => {
            let store_config = config.store.clone();
            tokio::task::spawn_blocking(move || kv::open(&store_config))
                .await
                .context("Store initialization task failed")?
        }
    };

    // Registration happens here, on one task, before anything is accepted.
    let mut table = CommandTable::new();
    handlers::register_builtins(&mut table, Arc::clone(&store));

    let candidates = plugin::discover(&config.plugins);
    let mut plugins = plugin::load_all(&candidates, &mut table, &store);
    for instance in static_plugins {
        match plugin::install_static(instance, &mut table, &store) {
            Ok(record) => {
                info!("Installed built-in plugin '{}'.", record.name());
                plugins.push(record);
            }
            Err(e) => error!("Skipping plugin: {}", e),
        }
    }
    if !candidates.is_empty() && plugins.is_empty() {
        warn!("None of the {} plugin module(s) could be loaded.", candidates.len());
    }
    info!(
        "{} command(s) registered: {}",
        table.len(),
        table.names().join(", ")
    );
    let table = Arc::new(table);

    let state = Arc::new(ServerState::new(config, store));
    info!(
        "Hookline server listening on {}",
        listener.local_addr().context("Listener has no local address")?
    );

    let mut background_tasks = JoinSet::new();
    if state.config.metrics.enabled {
        background_tasks.spawn(metrics_server::run_metrics_server(
            state.clone(),
            shutdown_tx.subscribe(),
        ));
    }

    Ok(ServerContext {
        state,
        table,
        plugins,
        listener,
        shutdown_tx,
        background_tasks,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Server configured for at most {} clients, {} byte lines.",
        config.max_clients, config.max_line_length
    );
    if config.store.enabled {
        info!(
            "Session store at {}:{} (db {}).",
            config.store.host, config.store.port, config.store.database
        );
    } else {
        warn!("External store disabled. Session state will not survive a restart.");
    }
}
