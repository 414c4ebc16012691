// Tracing subscriber setup for the binary

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const DEFAULT_LEVEL: &str = "info";

/// Filter directive: `RUST_LOG` wins, then `--verbose`, then the configured level
pub fn filter_directive(rust_log: Option<&str>, level: Option<&str>, verbose: bool) -> String {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(env) => env.to_string(),
        None if verbose => "debug".to_string(),
        None => level.unwrap_or(DEFAULT_LEVEL).to_string(),
    }
}

/// Install the global subscriber. Events go to stderr and, when `file` is set,
/// are appended to that file without colors.
pub fn init(level: Option<&str>, verbose: bool, file: Option<&Path>) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(rust_log.as_deref(), level, verbose);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {}", directive))?;

    let file_layer = match file {
        Some(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(log_file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
