// plugins/echo/src/lib.rs

//! A plugin that replies to `echo` with the full command line it received.
//!
//! Build it as a `cdylib` and drop the library into the server's plugin
//! directory, or link it in with `ServerBuilder::with_plugin`.

use hookline::plugin::{Plugin, Registrar};
use tracing::debug;

/// The command name this plugin answers.
pub const ECHO_COMMAND: &str = "echo";

#[derive(Debug, Default)]
pub struct EchoPlugin;

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn initialize(&self, registrar: &mut Registrar) {
        registrar.register(ECHO_COMMAND, |conn, payload| {
            debug!("Session {}: echoing {} bytes", conn.id(), payload.len());
            conn.send(format!("echo: {payload}"));
        });
    }
}

hookline::declare_plugin!(EchoPlugin, EchoPlugin::default);
