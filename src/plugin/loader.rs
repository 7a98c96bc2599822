// src/plugin/loader.rs

//! Loads plugin modules at startup and unloads them after the server stops.
//!
//! All `unsafe` code for dynamic loading lives here. The dispatch table and
//! the connection actors never learn whether a handler came from a module.

use super::{PLUGIN_ENTRY_SYMBOL, Plugin, PluginCreateFn, PluginError, Registrar};
use crate::config::PluginsConfig;
use crate::core::dispatch::CommandTable;
use crate::core::kv::KeyValueStore;
use crate::core::metrics;
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const UNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One initialized plugin.
///
/// Field order matters: the instance is dropped before the library, because
/// its code (including its destructor) lives inside that library.
pub struct PluginRecord {
    path: PathBuf,
    name: String,
    instance: Box<dyn Plugin>,
    /// `None` for plugins linked into the binary.
    library: Option<Library>,
}

impl PluginRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("dynamic", &self.library.is_some())
            .finish()
    }
}

/// Builds the ordered list of candidate module paths: explicit paths first,
/// then the files in the plugin directory carrying the platform's
/// dynamic-library extension, sorted by name. Duplicates are dropped.
pub fn discover(config: &PluginsConfig) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for path in &config.paths {
        if !candidates.contains(path) {
            candidates.push(path.clone());
        }
    }

    let Some(dir) = config.plugins_dir() else {
        return candidates;
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            info!("Plugin directory '{}' not scanned: {}", dir.display(), e);
            return candidates;
        }
    };

    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
        })
        .collect();
    found.sort();
    for path in found {
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    }
    candidates
}

/// Loads and initializes every module in `paths`, in order. A module that
/// fails at any step is logged and skipped; the rest still load.
pub fn load_all(
    paths: &[PathBuf],
    table: &mut CommandTable,
    store: &Arc<dyn KeyValueStore>,
) -> Vec<PluginRecord> {
    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match load(path, table, store) {
            Ok(record) => {
                info!(
                    "Loaded plugin '{}' from '{}'.",
                    record.name,
                    record.path.display()
                );
                records.push(record);
            }
            Err(e) => error!("Skipping plugin: {}", e),
        }
    }
    metrics::PLUGINS_LOADED.add(records.len() as f64);
    records
}

/// Loads one module, resolves its factory, and initializes the plugin.
pub fn load(
    path: &Path,
    table: &mut CommandTable,
    store: &Arc<dyn KeyValueStore>,
) -> Result<PluginRecord, PluginError> {
    // SAFETY: loading a library runs its initializers. Plugin modules are
    // trusted code named by the operator's configuration.
    let library = unsafe { Library::new(path) }.map_err(|source| PluginError::ModuleLoad {
        path: path.to_path_buf(),
        source,
    })?;

    // SAFETY: the symbol type matches what `declare_plugin!` exports. The
    // function pointer is copied out and only used while `library` is alive.
    let create: PluginCreateFn =
        match unsafe { library.get::<PluginCreateFn>(PLUGIN_ENTRY_SYMBOL.as_bytes()) } {
            Ok(symbol) => *symbol,
            Err(source) => {
                return Err(PluginError::SymbolResolution {
                    path: path.to_path_buf(),
                    symbol: PLUGIN_ENTRY_SYMBOL,
                    source,
                });
            }
        };

    // SAFETY: the factory hands over ownership of a `Box<Box<dyn Plugin>>`
    // allocated with the global allocator, which the module shares with us.
    let raw = unsafe { create() };
    if raw.is_null() {
        return Err(PluginError::NullInstance {
            path: path.to_path_buf(),
        });
    }
    let instance: Box<dyn Plugin> = *unsafe { Box::from_raw(raw) };

    initialize(path.to_path_buf(), instance, Some(library), table, store)
}

/// Initializes a plugin linked into the binary through the same path as a
/// loaded module.
pub fn install_static(
    plugin: Box<dyn Plugin>,
    table: &mut CommandTable,
    store: &Arc<dyn KeyValueStore>,
) -> Result<PluginRecord, PluginError> {
    let path = PathBuf::from(format!("<static:{}>", plugin.name()));
    let record = initialize(path, plugin, None, table, store)?;
    metrics::PLUGINS_LOADED.inc();
    Ok(record)
}

fn initialize(
    path: PathBuf,
    instance: Box<dyn Plugin>,
    library: Option<Library>,
    table: &mut CommandTable,
    store: &Arc<dyn KeyValueStore>,
) -> Result<PluginRecord, PluginError> {
    let name = instance.name().to_string();
    let mut registrar = Registrar::new(name.clone(), Arc::clone(store));

    if let Err(message) = instance.initialize_contained(&mut registrar) {
        // Staged handlers and the instance hold code from the module, so they
        // must be gone before the library is closed.
        drop(registrar);
        drop(instance);
        drop(library);
        return Err(PluginError::InitPanicked { name, message });
    }

    let registered = registrar.commit(table);
    debug!("Plugin '{}' registered {} command(s).", name, registered);
    Ok(PluginRecord {
        path,
        name,
        instance,
        library,
    })
}

/// Unloads every plugin once nothing can call into them anymore.
///
/// Must be called after the reactor has stopped accepting and every
/// connection task has finished. Handlers still running on the blocking pool
/// hold a reference to the table, so this waits up to `grace` for `table` to
/// become the last reference. If it does not, the modules are deliberately
/// leaked instead of unloaded.
pub async fn unload_all(records: Vec<PluginRecord>, table: Arc<CommandTable>, grace: Duration) {
    let deadline = Instant::now() + grace;
    let mut table = table;
    loop {
        match Arc::try_unwrap(table) {
            Ok(owned) => {
                drop(owned);
                break;
            }
            Err(shared) => {
                if Instant::now() >= deadline {
                    warn!(
                        "Command table still has {} other owner(s) after {:?}; leaving {} plugin module(s) loaded.",
                        Arc::strong_count(&shared) - 1,
                        grace,
                        records.len()
                    );
                    for record in records {
                        std::mem::forget(record);
                    }
                    return;
                }
                table = shared;
                tokio::time::sleep(UNLOAD_POLL_INTERVAL).await;
            }
        }
    }

    for record in records.into_iter().rev() {
        let PluginRecord {
            path,
            name,
            instance,
            library,
        } = record;
        if let Err(message) = instance.on_unload_contained() {
            warn!("Plugin '{}' panicked in on_unload: {}", name, message);
        }
        drop(instance);
        if let Some(library) = library {
            if let Err(e) = library.close() {
                error!("Failed to unload plugin module '{}': {}", path.display(), e);
            } else {
                info!("Unloaded plugin '{}' from '{}'.", name, path.display());
            }
        }
        metrics::PLUGINS_LOADED.dec();
    }
}
