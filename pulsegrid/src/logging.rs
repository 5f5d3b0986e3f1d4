//! tracing subscriber setup.
//!
//! Headless runs log to stderr. The TUI owns the terminal, so it only logs when a
//! file is given. `RUST_LOG` overrides the default `pulsegrid=info` filter.

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "pulsegrid=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns `Ok(false)` when nothing was installed.
pub fn init(log_file: Option<&Path>, headless: bool) -> Result<bool> {
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
            .try_init()
            .map_err(|e| anyhow!("installing log subscriber: {e}"))?;
        return Ok(true);
    }

    if headless {
        tracing_subscriber::registry()
            .with(filter())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow!("installing log subscriber: {e}"))?;
        return Ok(true);
    }

    Ok(false)
}
