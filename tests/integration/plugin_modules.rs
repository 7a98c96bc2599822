// tests/integration/plugin_modules.rs

//! Builds the bundled plugin crates as dynamic libraries so tests can load
//! real modules.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Library name of the echo plugin crate.
pub const ECHO_MODULE: &str = "hookline_echo";
/// Library name of the plugin whose code panics.
pub const FAULTY_MODULE: &str = "hookline_faulty";
/// Store key that makes the faulty plugin panic in `initialize`.
pub const FAULTY_PANIC_ON_INIT_KEY: &str = "faulty:panic-on-init";

const PLUGIN_PACKAGES: [&str; 2] = ["hookline-echo", "hookline-faulty"];

/// A target directory of its own, so the nested build does not wait on the
/// lock held by the running `cargo test`.
fn target_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join("plugin-modules")
}

/// Builds every plugin crate once per test binary and returns the artifact directory.
fn build_once() -> &'static Result<PathBuf, String> {
    static BUILT: OnceLock<Result<PathBuf, String>> = OnceLock::new();
    BUILT.get_or_init(|| {
        let cargo = std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into());
        let release = !cfg!(debug_assertions);

        let mut command = Command::new(cargo);
        command
            .current_dir(env!("CARGO_MANIFEST_DIR"))
            .arg("build")
            .arg("--quiet")
            .arg("--target-dir")
            .arg(target_dir());
        for package in PLUGIN_PACKAGES {
            command.args(["-p", package]);
        }
        if release {
            command.arg("--release");
        }

        let status = command
            .status()
            .map_err(|e| format!("failed to run cargo: {e}"))?;
        if !status.success() {
            return Err(format!("building the plugin modules failed: {status}"));
        }
        Ok(target_dir().join(if release { "release" } else { "debug" }))
    })
}

/// Path of the built dynamic library for `lib_name`, building it on first use.
pub fn module_path(lib_name: &str) -> PathBuf {
    let dir = match build_once() {
        Ok(dir) => dir,
        Err(e) => panic!("{e}"),
    };
    let path = dir.join(format!("{DLL_PREFIX}{lib_name}{DLL_SUFFIX}"));
    assert!(path.is_file(), "missing plugin module {}", path.display());
    path
}
