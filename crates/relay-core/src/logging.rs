use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then `info`.
pub fn init(service_name: &str) -> Result<()> {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,relay={level},relay_core={level},relay_openrouter={level},relay_telegram={level},{service_name}={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))?;

    Ok(())
}
