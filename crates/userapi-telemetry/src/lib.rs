//! Logging and distributed tracing setup for the User API server.
//!
//! The server crate only emits `tracing` events and, when a tracer handle is
//! configured, OpenTelemetry spans. This crate installs the subscriber that
//! formats those events and the tracer provider that exports those spans.
//!
//! - **Logging**: `tracing-subscriber` with JSON output for production and
//!   pretty output in debug mode
//! - **Tracing**: OpenTelemetry with OTLP export and W3C trace context
//!   propagation
//!
//! # Example
//!
//! ```rust,ignore
//! use userapi_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::for_debug(true))?;
//! tracing::info!(operation = "get_user_by_user_id", "Processing request");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod tracing;

pub use crate::error::TelemetryError;
pub use crate::logging::{init_logging, LogConfig, LogFormat};
pub use crate::tracing::{
    extract_context, init_tracing, shutdown_tracing, tracer, HeaderExtractor, TracingConfig,
};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
