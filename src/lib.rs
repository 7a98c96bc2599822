// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;
pub mod plugin;
pub mod server;

// Re-export
pub use crate::connection::Connection;
pub use crate::plugin::{Plugin, Registrar};
