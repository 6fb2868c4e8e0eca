//! Server error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::{LifecycleError, LifecycleState};
use crate::router::RouteError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors produced by the server lifecycle.
///
/// Configuration and route errors surface from [`Server::new`](crate::Server::new)
/// and prevent the server from ever serving. Bind and TLS errors surface when
/// serving begins and are never retried. Shutdown and lifecycle errors are
/// returned to whoever requested the shutdown.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A route pattern could not be registered.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Failed to bind the listen address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// TLS certificate or key material could not be read.
    #[error("Failed to read TLS material from {}: {source}", path.display())]
    TlsMaterial {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// TLS material was read but is unusable.
    #[error("Invalid TLS configuration: {0}")]
    Tls(String),

    /// OS signal handlers could not be installed.
    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    /// The drain deadline expired before every connection closed.
    #[error("Graceful shutdown timed out with {active} connections still open")]
    ShutdownTimeout {
        /// Connections that were still open
        active: usize,
    },

    /// A post-shutdown callback failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The requested transition is not valid from the current state.
    #[error("Cannot serve: server is {0}")]
    InvalidState(LifecycleState),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ServerError::config("address is required");
        assert_eq!(err.to_string(), "Configuration error: address is required");
    }

    #[test]
    fn test_bind_error_keeps_source() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };

        assert!(err.to_string().contains("127.0.0.1:80"));
        let source = std::error::Error::source(&err).unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::AddrInUse);
    }

    #[test]
    fn test_shutdown_timeout_display() {
        let err = ServerError::ShutdownTimeout { active: 3 };
        assert!(err.to_string().contains("3 connections"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = ServerError::InvalidState(LifecycleState::Stopped);
        assert_eq!(err.to_string(), "Cannot serve: server is stopped");
    }
}
