// src/connection/handle.rs

//! Defines `Connection`, the handle through which handlers talk to a client.

use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// An item queued for the connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame. The writer appends the terminating newline.
    Frame(String),
    /// Flush everything queued before this marker, then shut the socket down.
    Close,
}

/// One live client connection, as seen by handlers.
///
/// The handle is shared (`Arc`) between the connection's actor task, the
/// server's live-connection set and any handler currently running for it, so
/// it stays valid for as long as any of them still needs it. Sending never
/// blocks: frames are queued and transmitted asynchronously by the actor.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
    /// Non-owning back-reference; the server outlives every connection.
    server: Weak<ServerState>,
}

impl Connection {
    /// Creates a connection handle and the receiving end of its outbound queue.
    pub fn channel(
        id: u64,
        peer: SocketAddr,
        server: Weak<ServerState>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id,
            peer,
            outbound: tx,
            closed: AtomicBool::new(false),
            server,
        });
        (conn, rx)
    }

    /// The server-assigned session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a frame for transmission. Returns `false` if the connection is
    /// already closed, in which case the frame is dropped.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.outbound.send(Outbound::Frame(frame.into())).is_err() {
            self.closed.store(true, Ordering::Release);
            return false;
        }
        true
    }

    /// Requests an orderly close. Frames queued before the call are still sent.
    /// Calling it more than once has no further effect.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.outbound.is_closed()
    }

    /// The server this connection belongs to, if it is still running.
    pub fn server(&self) -> Option<Arc<ServerState>> {
        self.server.upgrade()
    }

    /// Marks the handle closed once the actor has torn the socket down.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
