//! Logging initialization.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a `fmt`
//! layer writing to stderr, so a manifest printed on stdout is never mixed
//! with log lines.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Supported values for the log format setting.
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Multi-line human-readable output
/// * `"compact"` - Single-line human-readable output
///
/// # Errors
///
/// Returns an error for an unknown format or if a global subscriber is
/// already installed.
pub fn init_tracing(level: &str, format: &str) -> Result<()> {
    check_format(format)?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e))?,
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e))?,
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize compact tracing subscriber: {}", e))?,
    }

    Ok(())
}

/// Rejects log formats [`init_tracing`] does not know.
pub fn check_format(format: &str) -> Result<()> {
    if LOG_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'pretty', 'compact' or 'json'",
            format
        ))
    }
}
