//! Logging init: file under the XDG state dir, or stderr when the state
//! dir is unusable.

use anyhow::Result;
use std::fs;
use std::io;

const DEFAULT_FILTER: &str = "info,bget_core=debug,bget_cli=debug";

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize structured logging to `~/.local/state/bget/bget.log`.
/// Returns Err when the log file cannot be set up so the caller can fall
/// back to stderr instead of crashing.
pub fn init_logging() -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bget")?;
    let log_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("bget.log");

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Each log line gets its own handle; a failed clone falls back to
    // stderr for that line rather than losing it.
    let writer = move || -> Box<dyn io::Write> {
        match file.try_clone() {
            Ok(f) => Box::new(f),
            Err(_) => Box::new(io::stderr()),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!("bget logging initialized at {}", log_path.display());
    Ok(())
}

/// Stderr-only logging, for when `init_logging` fails.
pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
