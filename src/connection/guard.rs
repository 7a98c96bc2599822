// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard that removes a connection from the live set when its actor
/// exits, whichever way it exits.
pub struct ConnectionGuard {
    /// A shared reference to the server state.
    pub(crate) state: Arc<ServerState>,
    /// The unique identifier for the client session.
    pub(crate) session_id: u64,
    /// The network address of the client.
    pub(crate) addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, session_id: u64, addr: SocketAddr) -> Self {
        Self {
            state,
            session_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {}",
            self.addr
        );

        // Handlers still running for this session keep their own `Arc` to the
        // connection, so removing it here never frees it out from under them.
        if let Some((_, conn)) = self.state.clients.remove(&self.session_id) {
            conn.mark_closed();
        } else {
            debug!(
                "Client {} was not in the live-connection set upon cleanup.",
                self.addr
            );
        }
    }
}
