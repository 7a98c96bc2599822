// src/server/mod.rs

use crate::config::Config;
use crate::core::kv::KeyValueStore;
use crate::core::state::ServerState;
use crate::plugin::{Plugin, PluginRecord};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;

use context::ServerContext;

/// Assembles a server: configuration, an optional store override and any
/// statically linked plugins.
pub struct ServerBuilder {
    config: Config,
    store: Option<Arc<dyn KeyValueStore>>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl ServerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            plugins: Vec::new(),
        }
    }

    /// Uses `store` instead of opening the one described by the configuration.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Installs a plugin compiled into the binary alongside any loaded modules.
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Runs every startup phase and binds the listener. The returned server
    /// has a complete dispatch table but accepts nothing until it is run.
    pub async fn bind(self) -> Result<Server> {
        let ctx = initialization::setup(self.config, self.store, self.plugins).await?;
        Ok(Server { ctx })
    }
}

/// A fully initialized server, ready to accept connections.
pub struct Server {
    ctx: ServerContext,
}

impl Server {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.ctx.listener.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.ctx.state)
    }

    /// Names of every registered command, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.ctx
            .table
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn plugins(&self) -> &[PluginRecord] {
        &self.ctx.plugins
    }

    /// Serves until `shutdown` resolves, then shuts down gracefully.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        connection_loop::run(self.ctx, shutdown).await;
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        self.run_until(async move {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
                _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
            }
        })
        .await;
        Ok(())
    }
}

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Bind, open the store, register built-ins and plugins.
    let server = ServerBuilder::new(config).bind().await?;

    // 2. Accept connections until a signal arrives, then drain and unload.
    server.run().await
}
