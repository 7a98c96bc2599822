// src/core/handlers.rs

//! Commands that are always available, registered before any plugin is loaded.
//! A plugin registering the same name replaces the built-in.

use crate::connection::Connection;
use crate::core::dispatch::CommandTable;
use crate::core::kv::KeyValueStore;
use crate::core::protocol::message::payload_field;
use std::sync::Arc;
use tracing::debug;

/// The registration source recorded for built-in commands.
pub const BUILTIN_SOURCE: &str = "builtin";

/// Prefix of the store keys holding login sessions.
pub const SESSION_KEY_PREFIX: &str = "sess:";

/// The value stored for an active session.
const SESSION_VALID: &str = "valid";

/// Registers every built-in command into `table`.
pub fn register_builtins(table: &mut CommandTable, store: Arc<dyn KeyValueStore>) {
    let login_store = Arc::clone(&store);
    table.register("login", BUILTIN_SOURCE, move |conn, payload| {
        login(login_store.as_ref(), conn, payload)
    });

    let session_store = store;
    table.register("session", BUILTIN_SOURCE, move |conn, payload| {
        session(session_store.as_ref(), conn, payload)
    });

    table.register("ping", BUILTIN_SOURCE, |conn, _payload| {
        conn.send("pong");
    });

    table.register("quit", BUILTIN_SOURCE, |conn, _payload| {
        conn.send("bye");
        conn.close();
    });

    table.register("clients", BUILTIN_SOURCE, |conn, _payload| {
        let count = conn.server().map_or(0, |server| server.client_count());
        conn.send(format!("clients: {count}"));
    });
}

/// Records a session for the payload's `token` in the store.
fn login(store: &dyn KeyValueStore, conn: &Connection, payload: &str) {
    let Some(token) = payload_field(payload, "token") else {
        conn.send("login: missing token");
        return;
    };
    let key = format!("{SESSION_KEY_PREFIX}{token}");
    if store.set(&key, SESSION_VALID) {
        debug!("Session {}: login recorded under '{}'", conn.id(), key);
        conn.send("login: ok");
    } else {
        conn.send("login: fail");
    }
}

/// Reports the stored session state for the payload's `token`.
fn session(store: &dyn KeyValueStore, conn: &Connection, payload: &str) {
    let Some(token) = payload_field(payload, "token") else {
        conn.send("session: missing token");
        return;
    };
    match store.get(&format!("{SESSION_KEY_PREFIX}{token}")) {
        Some(value) => conn.send(format!("session: {value}")),
        None => conn.send("session: none"),
    };
}
