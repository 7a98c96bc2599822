// plugins/faulty/src/lib.rs

//! A plugin whose code panics on purpose.
//!
//! `fault` always panics. When the shared store holds
//! [`PANIC_ON_INIT_KEY`] at startup, `initialize` panics as well, after
//! registering `fault`.

use hookline::plugin::{Plugin, Registrar};

/// The command whose handler always panics.
pub const FAULT_COMMAND: &str = "fault";

/// Store key that makes `initialize` panic.
pub const PANIC_ON_INIT_KEY: &str = "faulty:panic-on-init";

#[derive(Debug, Default)]
pub struct FaultyPlugin;

impl Plugin for FaultyPlugin {
    fn name(&self) -> &str {
        "faulty"
    }

    fn initialize(&self, registrar: &mut Registrar) {
        registrar.register(FAULT_COMMAND, |_conn, _payload| {
            panic!("fault handler panicked");
        });
        if registrar.store().get(PANIC_ON_INIT_KEY).is_some() {
            panic!("faulty plugin refused to initialize");
        }
    }
}

hookline::declare_plugin!(FaultyPlugin, FaultyPlugin::default);
