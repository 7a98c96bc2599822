// src/core/kv/resp_store.rs

//! A synchronous RESP client owning a single connection to the external store.

use super::{KeyValueStore, StoreError};
use crate::config::StoreConfig;
use crate::core::metrics;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// A live socket to the store plus its pending reply bytes.
struct StoreConnection {
    stream: TcpStream,
    read_buf: BytesMut,
}

/// The store client. Calls are serialized through one mutex-guarded socket,
/// since several connections may run handlers on the blocking pool at once.
pub struct RespStore {
    config: StoreConfig,
    conn: Mutex<Option<StoreConnection>>,
}

impl RespStore {
    /// Connects to the configured store. A failure is logged, not returned:
    /// the client starts disconnected and every call reports failure until a
    /// later call manages to reconnect.
    pub fn connect(config: StoreConfig) -> Self {
        let conn = match open_connection(&config) {
            Ok(conn) => {
                info!("Connected to store at {}:{}", config.host, config.port);
                Some(conn)
            }
            Err(e) => {
                warn!(
                    "Could not connect to store at {}:{}: {}. Session state will not be persisted until it is reachable.",
                    config.host, config.port, e
                );
                None
            }
        };
        Self {
            config,
            conn: Mutex::new(conn),
        }
    }

    /// Returns true if the client currently holds an open socket.
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Sends one command and waits for its reply. Any failure drops the socket so
    /// the next call starts from a fresh connection.
    fn request(&self, frame: RespFrame) -> Result<RespFrame, StoreError> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            debug!("Store connection is down, attempting to reconnect.");
            *guard = Some(open_connection(&self.config)?);
            info!("Reconnected to store at {}:{}", self.config.host, self.config.port);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Disconnected);
        };

        match conn.round_trip(frame) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    fn record_failure(&self, op: &str, key: &str, e: &StoreError) {
        metrics::STORE_ERRORS_TOTAL.inc();
        warn!("Store {} for key '{}' failed: {}", op, key, e);
    }
}

impl KeyValueStore for RespStore {
    fn set(&self, key: &str, value: &str) -> bool {
        match self.request(RespFrame::command(["SET", key, value])) {
            Ok(RespFrame::SimpleString(s)) if s == "OK" => true,
            Ok(other) => {
                self.record_failure("SET", key, &StoreError::Rejected(format!("{other:?}")));
                false
            }
            Err(e) => {
                self.record_failure("SET", key, &e);
                false
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.request(RespFrame::command(["GET", key])) {
            Ok(RespFrame::BulkString(bs)) => Some(String::from_utf8_lossy(&bs).into_owned()),
            Ok(RespFrame::Null) => None,
            Ok(other) => {
                self.record_failure("GET", key, &StoreError::Rejected(format!("{other:?}")));
                None
            }
            Err(e) => {
                self.record_failure("GET", key, &e);
                None
            }
        }
    }
}

impl StoreConnection {
    fn round_trip(&mut self, frame: RespFrame) -> Result<RespFrame, StoreError> {
        let mut write_buf = BytesMut::new();
        RespFrameCodec.encode(frame, &mut write_buf)?;
        self.stream
            .write_all(&write_buf)
            .map_err(StoreError::from_io)?;

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(reply) = RespFrameCodec.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            let n = self.stream.read(&mut chunk).map_err(StoreError::from_io)?;
            if n == 0 {
                return Err(StoreError::Disconnected);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Sends a command whose only acceptable reply is `+OK`.
    fn expect_ok(&mut self, frame: RespFrame) -> Result<(), StoreError> {
        match self.round_trip(frame)? {
            RespFrame::SimpleString(s) if s == "OK" => Ok(()),
            RespFrame::Error(e) => Err(StoreError::Rejected(e)),
            other => Err(StoreError::Rejected(format!("{other:?}"))),
        }
    }
}

/// Opens, configures and authenticates a socket to the store.
fn open_connection(config: &StoreConfig) -> Result<StoreConnection, StoreError> {
    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(StoreError::from_io)?;

    let mut last_err = None;
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_err = Some(StoreError::from_io(e)),
        }
    }
    let stream = match stream {
        Some(s) => s,
        None => return Err(last_err.unwrap_or(StoreError::Disconnected)),
    };

    stream.set_read_timeout(Some(config.io_timeout))?;
    stream.set_write_timeout(Some(config.io_timeout))?;
    stream.set_nodelay(true)?;

    let mut conn = StoreConnection {
        stream,
        read_buf: BytesMut::with_capacity(READ_CHUNK),
    };
    if let Some(password) = &config.password {
        conn.expect_ok(RespFrame::command(["AUTH", password.as_str()]))?;
    }
    if config.database != 0 {
        let db = config.database.to_string();
        conn.expect_ok(RespFrame::command(["SELECT", db.as_str()]))?;
    }
    Ok(conn)
}
