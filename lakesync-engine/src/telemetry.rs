//! Subscriber setup for hosts embedding the engine.
//!
//! The library crates only emit `tracing` events. A host that has no
//! subscriber of its own can call [`init_tracing`] once at startup.

use lakesync_core::{EngineError, LakesyncResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "lakesync_engine=info,lakesync_storage=info,warn";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives (env `LAKESYNC_LOG`).
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    /// (env `LAKESYNC_LOG_FORMAT=json`).
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var("LAKESYNC_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("LAKESYNC_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// Unparsable filter directives fall back to the default filter. Fails if a
/// global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> LakesyncResult<()> {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json_layer, text_layer) = if config.json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| EngineError::Telemetry {
            reason: format!("Failed to init subscriber: {}", e),
        })?;

    tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakesync_core::LakesyncError;

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig {
            filter: "not a [valid filter".to_string(),
            json: true,
        };
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(
            err,
            LakesyncError::Engine(EngineError::Telemetry { .. })
        ));
    }
}
