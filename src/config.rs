// src/config.rs

//! Manages server configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Connection parameters for the external key-value store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreConfig {
    /// If false, an in-process store is used instead of an external one.
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    /// Sent with `AUTH` right after connecting, when set.
    #[serde(default)]
    pub password: Option<String>,
    /// Sent with `SELECT` right after connecting, when non-zero.
    #[serde(default)]
    pub database: u32,
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    pub connect_timeout: Duration,
    /// Read and write timeout for every request on the store socket.
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    pub io_timeout: Duration,
}

fn default_store_enabled() -> bool {
    true
}
fn default_store_host() -> String {
    "127.0.0.1".to_string()
}
fn default_store_port() -> u16 {
    6379
}
fn default_store_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            host: default_store_host(),
            port: default_store_port(),
            password: None,
            database: 0,
            connect_timeout: default_store_timeout(),
            io_timeout: default_store_timeout(),
        }
    }
}

/// Where plugin modules are discovered.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PluginsConfig {
    /// A directory scanned for files with the platform's dynamic-library extension.
    /// Missing directories are skipped with a log line.
    #[serde(default = "default_plugin_dir")]
    pub dir: Option<PathBuf>,
    /// Explicit module paths, loaded in order before the directory scan.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

fn default_plugin_dir() -> Option<PathBuf> {
    Some(PathBuf::from("plugins"))
}

impl PluginsConfig {
    /// The directory to scan, if one is configured. An empty `dir` disables the scan.
    pub fn plugins_dir(&self) -> Option<&Path> {
        self.dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: default_plugin_dir(),
            paths: Vec::new(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8879
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_max_line_length")]
    max_line_length: usize,
    #[serde(with = "humantime_serde", default = "default_shutdown_grace")]
    shutdown_grace: Duration,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    plugins: PluginsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_max_line_length() -> usize {
    64 * 1024
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

/// The final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    /// The longest inbound line accepted, in bytes, excluding the newline.
    pub max_line_length: usize,
    /// How long shutdown waits for in-flight handlers before unloading plugins.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    pub store: StoreConfig,
    pub plugins: PluginsConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            max_line_length: default_max_line_length(),
            shutdown_grace: default_shutdown_grace(),
            store: StoreConfig::default(),
            plugins: PluginsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))?;
        if config.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        let config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            max_clients: raw.max_clients,
            max_line_length: raw.max_line_length,
            shutdown_grace: raw.shutdown_grace,
            store: raw.store,
            plugins: raw.plugins,
            metrics: raw.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.max_line_length == 0 {
            return Err(anyhow!("max_line_length cannot be 0"));
        }

        if self.store.enabled {
            if self.store.host.trim().is_empty() {
                return Err(anyhow!("store.host cannot be empty when the store is enabled"));
            }
            if self.store.port == 0 {
                return Err(anyhow!("store.port cannot be 0"));
            }
            if self.store.io_timeout.is_zero() || self.store.connect_timeout.is_zero() {
                return Err(anyhow!("store timeouts must be greater than 0"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }

        if self.plugins.plugins_dir().is_none() && self.plugins.paths.is_empty() {
            warn!("No plugin directory or plugin paths configured; only built-in commands will be available.");
        }
        Ok(())
    }
}
