// src/core/mod.rs

//! The central module containing the core logic and data structures of Hookline.

pub mod contain;
pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod kv;
pub mod metrics;
pub mod protocol;
pub mod state;

pub use dispatch::{CommandHandler, CommandTable};
pub use errors::HooklineError;
pub use protocol::Message;
