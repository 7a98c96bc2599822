// src/plugin/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Why a plugin module was skipped. None of these are fatal to the server.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The module file is missing or could not be linked into the process.
    #[error("failed to load plugin module '{}': {source}", path.display())]
    ModuleLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The module loaded but does not export the expected factory.
    #[error("plugin module '{}' does not export '{symbol}': {source}", path.display())]
    SymbolResolution {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// The factory returned a null instance, or its constructor panicked.
    #[error("plugin factory in '{}' returned no instance", path.display())]
    NullInstance { path: PathBuf },

    /// The plugin panicked inside `initialize`. Nothing it registered is kept.
    #[error("plugin '{name}' panicked during initialization: {message}")]
    InitPanicked { name: String, message: String },
}
