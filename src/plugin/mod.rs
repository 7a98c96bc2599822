// src/plugin/mod.rs

//! Runtime-loadable command plugins.
//!
//! A plugin is a dynamic library exporting one factory function,
//! `hookline_create_plugin`, that returns a boxed [`Plugin`]. At startup the
//! server loads every configured module, calls the factory, and lets the
//! plugin register its commands through a [`Registrar`]. Plugins must be
//! built with the same toolchain and `hookline` version as the server, since
//! the trait object crosses the library boundary with the Rust ABI.
//!
//! Panics never cross that boundary. The factory, `initialize`, `on_unload`
//! and every registered handler are entered through wrappers that are
//! compiled into the plugin module and catch the panic there.
//!
//! ```ignore
//! use hookline::plugin::{Plugin, Registrar};
//!
//! #[derive(Default)]
//! struct Shout;
//!
//! impl Plugin for Shout {
//!     fn name(&self) -> &str { "shout" }
//!     fn initialize(&self, registrar: &mut Registrar) {
//!         registrar.register("shout", |conn, payload| {
//!             conn.send(payload.to_uppercase());
//!         });
//!     }
//! }
//!
//! hookline::declare_plugin!(Shout, Shout::default);
//! ```

mod error;
mod loader;
mod registrar;

pub use error::PluginError;
pub use loader::{PluginRecord, discover, install_static, load, load_all, unload_all};
pub use registrar::Registrar;

use crate::core::contain::contain;

/// The symbol every plugin module must export.
pub const PLUGIN_ENTRY_SYMBOL: &str = "hookline_create_plugin";

/// The signature of the exported factory. The returned pointer owns a
/// `Box<dyn Plugin>` (boxed once more so the pointer is thin).
pub type PluginCreateFn = unsafe extern "C" fn() -> *mut Box<dyn Plugin>;

/// The capability every plugin implements.
pub trait Plugin: Send + Sync {
    /// A short name used in logs and as the registration source of its commands.
    fn name(&self) -> &str;

    /// Called once, on the startup thread, before the server accepts
    /// connections. This is the only point where a plugin can add commands.
    fn initialize(&self, registrar: &mut Registrar);

    /// Called at shutdown after no connection can reach the plugin's handlers
    /// anymore, right before the module is unloaded.
    fn on_unload(&self) {}

    /// Runs `initialize`, reporting a panic as `Err` with its message.
    /// Not meant to be overridden.
    #[doc(hidden)]
    fn initialize_contained(&self, registrar: &mut Registrar) -> Result<(), String> {
        contain(|| self.initialize(registrar))
    }

    /// Runs `on_unload`, reporting a panic as `Err` with its message.
    #[doc(hidden)]
    fn on_unload_contained(&self) -> Result<(), String> {
        contain(|| self.on_unload())
    }
}

/// Exports the factory function for a plugin type.
///
/// Takes the plugin type and a path to a constructor returning it. A
/// constructor that panics makes the factory return null.
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn hookline_create_plugin()
        -> *mut ::std::boxed::Box<dyn $crate::plugin::Plugin> {
            let constructor: fn() -> $plugin_type = $constructor;
            match $crate::core::contain::contain(constructor) {
                Ok(instance) => {
                    let plugin: ::std::boxed::Box<dyn $crate::plugin::Plugin> =
                        ::std::boxed::Box::new(instance);
                    ::std::boxed::Box::into_raw(::std::boxed::Box::new(plugin))
                }
                Err(_) => ::std::ptr::null_mut(),
            }
        }
    };
}
