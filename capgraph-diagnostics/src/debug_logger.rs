//! Structured debug logging bootstrap

use capgraph_core::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Include the event target in each line
    pub with_target: bool,
    /// Include thread ids; sample callbacks arrive on platform threads
    pub with_thread_ids: bool,
    /// Colored output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Debug output for the capture crates, info for everything else
    pub fn verbose() -> Self {
        Self {
            default_directive: "info,capgraph=debug,capgraph_media=debug,capgraph_core=debug"
                .to_string(),
            with_thread_ids: true,
            ..Self::default()
        }
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self {
            default_directive: "warn".to_string(),
            ..Self::default()
        }
    }
}

/// Debug logger for structured logging
#[derive(Debug, Clone, Default)]
pub struct DebugLogger {
    config: LoggingConfig,
}

impl DebugLogger {
    /// Create a logger with `config`
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Install this logger's subscriber
    pub fn install(&self) -> CaptureResult<()> {
        Self::init_logging(&self.config)
    }

    /// Filter built from `RUST_LOG`, or the configured default directive
    pub fn filter(config: &LoggingConfig) -> CaptureResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&config.default_directive).map_err(|e| {
                CaptureError::Configuration {
                    message: format!("invalid log directive '{}': {}", config.default_directive, e),
                }
            }),
        }
    }

    /// Initialize the global logging system
    ///
    /// Fails instead of panicking when a subscriber is already installed.
    pub fn init_logging(config: &LoggingConfig) -> CaptureResult<()> {
        let filter = Self::filter(config)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(config.with_target)
                    .with_thread_ids(config.with_thread_ids)
                    .with_ansi(config.ansi),
            )
            .try_init()
            .map_err(|e| CaptureError::Configuration {
                message: format!("logging already initialized: {}", e),
            })?;
        tracing::debug!("Logging initialized with '{}'", config.default_directive);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LoggingConfig::default().default_directive, "info");
        assert_eq!(LoggingConfig::quiet().default_directive, "warn");
        assert!(LoggingConfig::verbose().with_thread_ids);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig {
            ansi: false,
            ..LoggingConfig::default()
        };
        let first = DebugLogger::init_logging(&config);
        let second = DebugLogger::init_logging(&config);
        // Another test binary may have installed a subscriber first.
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(CaptureError::Configuration { .. })));
    }
}
