// src/core/errors.rs

//! Defines the primary error types for the server.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing failures that can occur while serving
/// connections. Setup-time failures are reported through `anyhow` instead.
#[derive(Error, Debug)]
pub enum HooklineError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Malformed message: {0}")]
    Malformed(#[from] MalformedMessage),

    #[error("Line exceeds the configured maximum length")]
    LineTooLong,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

/// The reasons the message codec rejects an inbound line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("line is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("invalid syntax: {0}")]
    InvalidSyntax(String),

    #[error("message is not an object")]
    NotAnObject,

    #[error("missing 'cmd' field")]
    MissingCommand,

    #[error("'cmd' field is not a string")]
    CommandNotString,
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for HooklineError {
    fn clone(&self) -> Self {
        match self {
            HooklineError::Io(e) => HooklineError::Io(Arc::clone(e)),
            HooklineError::Malformed(m) => HooklineError::Malformed(m.clone()),
            HooklineError::LineTooLong => HooklineError::LineTooLong,
            HooklineError::Internal(s) => HooklineError::Internal(s.clone()),
        }
    }
}

impl PartialEq for HooklineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HooklineError::Io(e1), HooklineError::Io(e2)) => e1.kind() == e2.kind(),
            (HooklineError::Malformed(m1), HooklineError::Malformed(m2)) => m1 == m2,
            (HooklineError::Internal(s1), HooklineError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl HooklineError {
    /// Returns true for errors that are an ordinary peer disconnect rather than a fault.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, HooklineError::Io(arc_err) if matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for HooklineError {
    fn from(e: std::io::Error) -> Self {
        HooklineError::Io(Arc::new(e))
    }
}

impl From<tokio_util::codec::LinesCodecError> for HooklineError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => HooklineError::LineTooLong,
            tokio_util::codec::LinesCodecError::Io(io) => HooklineError::from(io),
        }
    }
}
