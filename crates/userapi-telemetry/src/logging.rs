//! Structured logging setup.
//!
//! Production output is one JSON object per event so a collector can index
//! the request fields the server attaches (`operation`, `status`,
//! `duration_ms`). Debug mode switches to a readable line format and a more
//! verbose default filter.
//!
//! `RUST_LOG` always wins over the configured filter.
//!
//! ```rust,ignore
//! use userapi_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::for_debug(false))?;
//! tracing::info!(operation = "get_user_by_user_id", status = 200, "Request completed");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Noisy dependencies are held at `warn` unless the directive names them.
const DEPENDENCY_DIRECTIVES: &str = "hyper=warn,hyper_util=warn,rustls=warn,h2=warn,tonic=warn";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable single-line output
    Text,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Install nothing when `false`.
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `userapi_server=debug`.
    pub directive: String,
    /// Output format.
    pub format: LogFormat,
    /// Emit ANSI colors (text format only).
    pub ansi: bool,
    /// Attach the source file and line to every event.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_debug(false)
    }
}

impl LogConfig {
    /// JSON at `info` normally; text at `debug` with source locations when
    /// the server runs in debug mode.
    #[must_use]
    pub fn for_debug(debug: bool) -> Self {
        Self {
            enabled: true,
            directive: if debug { "debug" } else { "info" }.to_string(),
            format: if debug {
                LogFormat::Text
            } else {
                LogFormat::Json
            },
            ansi: false,
            source_location: debug,
        }
    }

    /// Builds the effective filter: `RUST_LOG` if set, else the configured
    /// directive with dependency defaults prepended.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::LoggingInit` for a malformed directive.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(format!("{DEPENDENCY_DIRECTIVES},{}", self.directive)).map_err(|e| {
            TelemetryError::LoggingInit(format!("invalid directive '{}': {e}", self.directive))
        })
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the directive is malformed or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let json = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_file(config.source_location)
            .with_line_number(config.source_location)
    });
    let text = (config.format == LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(config.ansi)
            .with_file(config.source_location)
            .with_line_number(config.source_location)
    });

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directive, "info");
        assert!(!config.source_location);
    }

    #[test]
    fn test_debug_mode() {
        let config = LogConfig::for_debug(true);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.directive, "debug");
        assert!(config.source_location);
        assert!(!config.ansi);
    }

    #[test]
    fn test_filter_accepts_module_directives() {
        let config = LogConfig {
            directive: "userapi_server=debug,warn".to_string(),
            ..LogConfig::default()
        };
        assert!(config.filter().is_ok());
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let config = LogConfig {
            enabled: false,
            directive: "[not a directive".to_string(),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
