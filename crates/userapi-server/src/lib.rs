//! # User API Server
//!
//! Lifecycle-managed HTTP server for the User API.
//!
//! This crate provides:
//!
//! - The [`Service`] boundary that business logic implements
//! - A fixed route table: `GET /user/{user_id}` plus health and schema
//!   endpoints
//! - A health flag that is true only while the server is serving
//! - Graceful shutdown on request or on SIGHUP, SIGINT and SIGTERM, with
//!   ordered post-shutdown hooks
//! - Optional TLS termination via rustls
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use userapi_server::{Server, ServerConfig, ShutdownHooks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .address("0.0.0.0:8080")
//!         .insecure_http(true)
//!         .build();
//!
//!     let server = Server::new(Arc::new(MyService), config)?;
//!     server.run_with_signal_handler(ShutdownHooks::new()).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/userapi-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
mod middleware;
pub mod operations;
pub mod response;
pub mod router;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod tls;
pub mod wellknown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ServerError, ServerResult};
pub use health::{health_response, HealthBody, HealthMonitor};
pub use lifecycle::{LifecycleError, LifecycleResult, LifecycleState, ShutdownHooks};
pub use router::{translate_path, HttpResponse, RouteError, RouteTable};
pub use server::{Server, ShutdownHandle};
pub use service::{ApiResponse, GetUserByUserIdParams, Service};
pub use shutdown::{ConnectionTracker, OsSignals, ShutdownSignal};
pub use wellknown::{SchemaDiscovery, SWAGGER_JSON};
