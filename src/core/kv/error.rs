// src/core/kv/error.rs

use crate::core::protocol::resp_frame::RespError;
use thiserror::Error;

/// Failures talking to the external store. These never leave the client; they
/// are logged and folded into the `bool`/`Option` results of `KeyValueStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the store")]
    Timeout,

    #[error("Protocol Error: {0}")]
    Protocol(#[from] RespError),

    #[error("no connection to the store")]
    Disconnected,

    #[error("store rejected the request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Normalizes socket timeouts, which surface as `WouldBlock` on some
    /// platforms and `TimedOut` on others.
    pub(crate) fn from_io(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => StoreError::Timeout,
            _ => StoreError::Io(e),
        }
    }
}
