// src/core/dispatch.rs

//! The command dispatch table: a mapping from command name to handler.
//!
//! The table is mutable only while the server is being built. Once it is
//! frozen into an `Arc<CommandTable>` and handed to the reactor, connections
//! can only look handlers up, so no locking is needed while serving.

use crate::connection::Connection;
use crate::core::contain::contain;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A command handler. It receives the connection the command arrived on and
/// the full payload, and may reply through `Connection::send`.
///
/// Handlers run on a blocking-capable thread, so synchronous work such as a
/// store call is fine, but it delays that connection's next read.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, conn: &Connection, payload: &str);

    /// Runs `handle` and reports a panic as `Err` with its message. The
    /// server always calls handlers through this method; implementors should
    /// not override it.
    #[doc(hidden)]
    fn handle_contained(&self, conn: &Connection, payload: &str) -> Result<(), String> {
        contain(|| self.handle(conn, payload))
    }
}

impl<F> CommandHandler for F
where
    F: Fn(&Connection, &str) + Send + Sync,
{
    fn handle(&self, conn: &Connection, payload: &str) {
        self(conn, payload)
    }
}

/// A registered handler together with the name of whoever registered it.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn CommandHandler>,
    /// `builtin` or the name of the plugin that registered the command.
    pub source: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Maps case-sensitive command names to handlers.
#[derive(Debug, Default)]
pub struct CommandTable {
    handlers: HashMap<String, Registration>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the closure `handler` under `name`, replacing any previous
    /// registration. Returns the registration that was replaced, if any.
    pub fn register<F>(&mut self, name: &str, source: &str, handler: F) -> Option<Registration>
    where
        F: Fn(&Connection, &str) + Send + Sync + 'static,
    {
        self.register_arc(name, source, Arc::new(handler))
    }

    /// Like `register`, for handler types implementing `CommandHandler` directly.
    pub fn register_handler<H>(
        &mut self,
        name: &str,
        source: &str,
        handler: H,
    ) -> Option<Registration>
    where
        H: CommandHandler + 'static,
    {
        self.register_arc(name, source, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        name: &str,
        source: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Registration> {
        self.handlers.insert(
            name.to_string(),
            Registration {
                handler,
                source: source.to_string(),
            },
        )
    }

    /// Looks up the handler registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).map(|r| Arc::clone(&r.handler))
    }

    /// Returns who registered `name`, if anyone.
    pub fn source_of(&self, name: &str) -> Option<&str> {
        self.handlers.get(name).map(|r| r.source.as_str())
    }

    /// All registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
