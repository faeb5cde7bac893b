//! Logging setup.
//!
//! stdout carries the supervisor protocol, so every log line goes to stderr.
//! The supervisor captures that stream into the listener's log file.

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `default_level` when it is set.
pub fn init(default_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level '{default_level}'"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("could not install log subscriber: {e}"))
}
