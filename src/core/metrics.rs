// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of clients currently connected to the server.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("hookline_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of plugin modules currently loaded.
    pub static ref PLUGINS_LOADED: Gauge =
        register_gauge!("hookline_plugins_loaded", "Number of plugin modules currently loaded.").unwrap();

    // --- Counters ---
    /// The total number of connections accepted by the server since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("hookline_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of commands dispatched to a handler.
    pub static ref COMMANDS_PROCESSED_TOTAL: Counter =
        register_counter!("hookline_commands_processed_total", "Total number of commands processed.").unwrap();
    pub static ref MALFORMED_FRAMES_TOTAL: Counter =
        register_counter!("hookline_malformed_frames_total", "Total number of inbound lines rejected by the codec.").unwrap();
    pub static ref UNKNOWN_COMMANDS_TOTAL: Counter =
        register_counter!("hookline_unknown_commands_total", "Total number of frames naming an unregistered command.").unwrap();
    /// The total number of failed calls to the external key-value store.
    pub static ref STORE_ERRORS_TOTAL: Counter =
        register_counter!("hookline_store_errors_total", "Total number of failed key-value store calls.").unwrap();

    // --- Histograms ---
    /// A histogram of handler execution latencies.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("hookline_command_latency_seconds", "Latency of handler execution in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
