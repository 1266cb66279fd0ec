use std::env;

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Parse `LOG_LEVEL`-style names, defaulting to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install a stderr fmt subscriber. `RUST_LOG` directives are honoured on
/// top of `SEQPILOT_LOG_LEVEL` (default info). Fails if a global subscriber
/// is already set.
pub fn init_tracing() -> Result<()> {
    let log_level = env::var("SEQPILOT_LOG_LEVEL")
        .map(|level| parse_level(&level))
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("tracing subscriber already installed: {e}"))?;

    Ok(())
}
