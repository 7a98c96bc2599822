// src/connection/mod.rs

//! Manages the lifecycle of a single client connection: reading lines,
//! dispatching commands, and writing replies.

mod guard;
mod handle;
mod handler;

pub use guard::ConnectionGuard;
pub use handle::{Connection, Outbound};
pub use handler::{ConnectionHandler, replies};
pub(crate) use handler::log_termination;
