//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while installing logging or tracing.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::LoggingInit("bad filter".to_string());
        assert_eq!(err.to_string(), "Failed to initialize logging: bad filter");

        let err = TelemetryError::TracingInit("no endpoint".to_string());
        assert_eq!(err.to_string(), "Failed to initialize tracing: no endpoint");
    }
}
