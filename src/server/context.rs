// src/server/context.rs

use crate::core::dispatch::CommandTable;
use crate::core::state::ServerState;
use crate::plugin::PluginRecord;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    /// The dispatch table, frozen once startup registration is over.
    pub table: Arc<CommandTable>,
    /// Every plugin that initialized successfully, in load order.
    pub plugins: Vec<PluginRecord>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
