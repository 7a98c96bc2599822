// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.
//!
//! The handler is a small state machine: it reads one line, parses it,
//! dispatches it, flushes whatever the handler queued, and only then reads the
//! next line. Any transport error or an explicit close ends the loop.

use super::guard::ConnectionGuard;
use super::handle::{Connection, Outbound};
use crate::core::dispatch::CommandTable;
use crate::core::errors::HooklineError;
use crate::core::metrics;
use crate::core::protocol::message;
use crate::core::state::ServerState;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead, FramedWrite, LinesCodec,
    LinesCodecError,
};
use tracing::{debug, error, info, warn};

/// Fixed replies the server itself writes.
pub mod replies {
    pub const MALFORMED: &str = "error: malformed";
    pub const UNKNOWN_COMMAND: &str = "error: unknown command";
    pub const LINE_TOO_LONG: &str = "error: line too long";
    pub const MAX_CLIENTS: &str = "error: max clients reached";
    pub const SHUTTING_DOWN: &str = "error: server shutting down";
    pub const INTERNAL: &str = "error: internal";
}

/// Inbound lines are framed as raw bytes so that invalid UTF-8 reaches the
/// message codec and is answered as malformed instead of failing the read.
type LineReader = FramedRead<OwnedReadHalf, AnyDelimiterCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// What woke the actor up while it was waiting in the reading state.
enum Event {
    Shutdown,
    Outbound(Option<Outbound>),
    Line(Option<Result<Bytes, AnyDelimiterCodecError>>),
}

/// The next step for the connection's main loop to take.
#[derive(Debug, PartialEq, Eq)]
enum NextAction {
    Continue,
    ExitLoop,
}

/// Manages the full lifecycle of a client connection.
pub struct ConnectionHandler {
    socket: Option<TcpStream>,
    conn: Arc<Connection>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    table: Arc<CommandTable>,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        conn: Arc<Connection>,
        outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        table: Arc<CommandTable>,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket: Some(socket),
            conn,
            outbound_rx,
            table,
            state,
            shutdown_rx,
        }
    }

    /// Runs the connection until the peer disconnects, an I/O error occurs,
    /// a handler closes it, or the server shuts down.
    pub async fn run(mut self) -> Result<(), HooklineError> {
        let _guard =
            ConnectionGuard::new(self.state.clone(), self.conn.id(), self.conn.peer_addr());
        let Some(socket) = self.socket.take() else {
            return Err(HooklineError::Internal("connection socket already taken".into()));
        };
        let (read_half, write_half) = socket.into_split();
        let mut reader = FramedRead::new(
            read_half,
            AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                self.state.config.max_line_length,
            ),
        );
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let result = self.serve(&mut reader, &mut writer).await;

        // Closed: later sends from lingering handlers are dropped.
        self.conn.mark_closed();
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!("Shutdown of {} failed: {}", self.conn.peer_addr(), e);
        }
        debug!("Session {}: connection closed.", self.conn.id());
        result
    }

    async fn serve(
        &mut self,
        reader: &mut LineReader,
        writer: &mut LineWriter,
    ) -> Result<(), HooklineError> {
        loop {
            let event = tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.shutdown_rx.recv() => Event::Shutdown,
                item = self.outbound_rx.recv() => Event::Outbound(item),
                line = reader.next() => Event::Line(line),
            };

            match event {
                Event::Shutdown => {
                    info!(
                        "Connection handler for {} received shutdown signal.",
                        self.conn.peer_addr()
                    );
                    if let Err(e) = writer.send(replies::SHUTTING_DOWN).await {
                        debug!("Shutdown notice to {} failed: {}", self.conn.peer_addr(), e);
                    }
                    return Ok(());
                }
                // Frames sent outside a dispatch, e.g. by a plugin holding
                // the connection from another thread.
                Event::Outbound(Some(item)) => {
                    if self.write_one(writer, item).await? == NextAction::ExitLoop {
                        return Ok(());
                    }
                    flush(writer).await?;
                }
                Event::Outbound(None) => return Ok(()),
                Event::Line(Some(Ok(frame))) => {
                    self.dispatch(frame).await;
                    if self.flush_queued(writer).await? == NextAction::ExitLoop {
                        return Ok(());
                    }
                }
                Event::Line(Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded))) => {
                    if let Err(e) = writer.send(replies::LINE_TOO_LONG).await {
                        debug!("Overlong-line reply to {} failed: {}", self.conn.peer_addr(), e);
                    }
                    return Err(HooklineError::LineTooLong);
                }
                Event::Line(Some(Err(AnyDelimiterCodecError::Io(e)))) => return Err(e.into()),
                Event::Line(None) => {
                    debug!("Connection from {} closed by peer.", self.conn.peer_addr());
                    return Ok(());
                }
            }
        }
    }

    /// Parses one line and runs the matching handler. Every outcome leaves
    /// its reply, if any, queued on the connection.
    async fn dispatch(&self, frame: Bytes) {
        let msg = match message::decode_line(&frame).and_then(message::parse) {
            Ok(msg) => msg,
            Err(e) => {
                metrics::MALFORMED_FRAMES_TOTAL.inc();
                debug!("Session {}: malformed frame: {}", self.conn.id(), e);
                self.conn.send(replies::MALFORMED);
                return;
            }
        };
        debug!("Session {}: Received command: {}", self.conn.id(), msg.command);

        let Some(handler) = self.table.lookup(&msg.command) else {
            metrics::UNKNOWN_COMMANDS_TOTAL.inc();
            debug!("Session {}: unknown command '{}'", self.conn.id(), msg.command);
            self.conn.send(replies::UNKNOWN_COMMAND);
            return;
        };

        let conn = Arc::clone(&self.conn);
        let table = Arc::clone(&self.table);
        let payload = msg.payload;
        let started = Instant::now();

        // Handlers may block (store calls), so they run off the reactor. The
        // task owns the connection and the table, which keeps the handler's
        // plugin module loaded until it returns.
        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = handler.handle_contained(&conn, &payload);
            drop(handler);
            drop(table);
            outcome
        })
        .await;

        metrics::COMMAND_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
        match outcome {
            Ok(Ok(())) => {
                metrics::COMMANDS_PROCESSED_TOTAL.inc();
                self.state.stats.increment_total_commands();
            }
            Ok(Err(message)) => {
                error!(
                    "Session {}: handler for '{}' panicked: {}",
                    self.conn.id(),
                    msg.command,
                    message
                );
                self.conn.send(replies::INTERNAL);
            }
            Err(e) => {
                error!(
                    "Session {}: handler for '{}' failed: {}",
                    self.conn.id(),
                    msg.command,
                    e
                );
                self.conn.send(replies::INTERNAL);
            }
        }
    }

    /// Writes every frame queued so far, stopping at a close marker.
    async fn flush_queued(&mut self, writer: &mut LineWriter) -> Result<NextAction, HooklineError> {
        while let Ok(item) = self.outbound_rx.try_recv() {
            if self.write_one(writer, item).await? == NextAction::ExitLoop {
                return Ok(NextAction::ExitLoop);
            }
        }
        flush(writer).await?;
        Ok(NextAction::Continue)
    }

    async fn write_one(
        &self,
        writer: &mut LineWriter,
        item: Outbound,
    ) -> Result<NextAction, HooklineError> {
        match item {
            Outbound::Frame(frame) => {
                writer.feed(frame).await?;
                Ok(NextAction::Continue)
            }
            Outbound::Close => {
                flush(writer).await?;
                debug!("Session {}: closed by handler.", self.conn.id());
                Ok(NextAction::ExitLoop)
            }
        }
    }
}

/// Flushes the line writer. The codec accepts any `AsRef<str>` item, so the
/// sink's item type has to be named here.
async fn flush(writer: &mut LineWriter) -> Result<(), LinesCodecError> {
    SinkExt::<String>::flush(writer).await
}

/// Logs how a connection ended, keeping ordinary disconnects quiet.
pub(crate) fn log_termination(addr: std::net::SocketAddr, result: Result<(), HooklineError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_normal_disconnect() => {
            debug!("Connection from {} closed by peer: {}", addr, e)
        }
        Err(e) => warn!("Connection from {} terminated unexpectedly: {}", addr, e),
    }
}
