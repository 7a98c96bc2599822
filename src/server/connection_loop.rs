// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::{Connection, ConnectionHandler, log_termination, replies};
use crate::core::metrics;
use crate::plugin;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long background tasks get to stop after the shutdown broadcast.
const BACKGROUND_TASK_GRACE: Duration = Duration::from_secs(10);

/// Accepts connections until `shutdown` resolves, then drains every
/// connection and unloads the plugins.
pub async fn run<F>(ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    let ServerContext {
        state,
        table,
        plugins,
        listener,
        shutdown_tx,
        mut background_tasks,
    } = ctx;
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => debug!("A background task finished."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                state.stats.increment_total_connections();

                if state.client_count() >= state.config.max_clients {
                    warn!("Rejecting {}: max clients ({}) reached.", addr, state.config.max_clients);
                    client_tasks.spawn(reject(socket, addr));
                    continue;
                }
                info!("Accepted new connection from: {}", addr);
                metrics::CONNECTED_CLIENTS.inc();

                session_id_counter = session_id_counter.wrapping_add(1);
                let session_id = session_id_counter;

                let (conn, outbound_rx) = Connection::channel(session_id, addr, Arc::downgrade(&state));
                state.clients.insert(session_id, Arc::clone(&conn));

                let handler = ConnectionHandler::new(
                    socket,
                    conn,
                    outbound_rx,
                    Arc::clone(&table),
                    Arc::clone(&state),
                    shutdown_tx.subscribe(),
                );
                client_tasks.spawn(async move {
                    log_termination(addr, handler.run().await);
                });
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    // Stop accepting before anything else.
    drop(listener);

    info!("Shutting down. Sending signal to all tasks.");
    if shutdown_tx.send(()).is_err() {
        debug!("No task was listening for the shutdown signal.");
    }

    let grace = state.config.shutdown_grace;
    if tokio::time::timeout(grace, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            "{} connection(s) still busy after {:?}; aborting them.",
            client_tasks.len(),
            grace
        );
    }
    client_tasks.shutdown().await;
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(BACKGROUND_TASK_GRACE, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };

    // Handlers can no longer be reached from a connection; plugin code may go.
    plugin::unload_all(plugins, table, grace).await;
    info!("Server shutdown complete.");
}

/// Tells a client over the connection limit why it is being dropped.
async fn reject(mut socket: TcpStream, addr: SocketAddr) {
    let reply = format!("{}\n", replies::MAX_CLIENTS);
    if let Err(e) = socket.write_all(reply.as_bytes()).await {
        debug!("Could not notify rejected client {}: {}", addr, e);
    }
    let _ = socket.shutdown().await;
}
