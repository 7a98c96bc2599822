// src/main.rs

//! The main entry point for the Hookline server application.

use anyhow::Result;
use hookline::config::Config;
use hookline::server;
use std::env;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

/// The configuration file read when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("Hookline version {VERSION}");
        return Ok(());
    }

    // An explicit --config path must load; the implicit default may be absent.
    let explicit_config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => Some(path.as_str()),
            None => {
                eprintln!("--config flag requires a value");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let config_path = explicit_config.unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = if explicit_config.is_none() && !Path::new(config_path).exists() {
        Config::default()
    } else {
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
                std::process::exit(1);
            }
        }
    };

    // Override port if provided as a command-line argument
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    // Get initial log level from env var or config.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::new(initial_log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    if explicit_config.is_none() && !Path::new(config_path).exists() {
        info!("No {} found; starting with the default configuration.", config_path);
    }

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
