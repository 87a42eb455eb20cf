// 📝 Logging - tracing-subscriber on stderr, text or JSON
//
// stdout is reserved for command output (status tables, reports), so every
// log line goes to stderr.

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Filter from RUST_LOG, falling back to the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // html5ever is chatty at debug
        EnvFilter::new(format!("html5ever=warn,selectors=warn,{}", config.level))
    })
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let layer = if config.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    Registry::default()
        .with(env_filter(config))
        .with(layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            json: true,
        };
        // the first call may lose to another test's subscriber; the second never wins
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
