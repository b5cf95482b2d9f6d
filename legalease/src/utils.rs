use crate::errors::{LegalEaseError, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `LOG_LEVEL` (error, warn, info, debug) sets the base level; `RUST_LOG`
/// directives are honoured on top of it. Output goes to stderr without ANSI
/// colours so it can be captured by a host process.
pub fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| LegalEaseError::Internal(format!("failed to initialise logging: {e}")))
}

/// Wall-clock time in epoch milliseconds
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cut `text` to at most `max_chars` characters, appending "..." when
/// anything was removed.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
