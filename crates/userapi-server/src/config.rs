//! Server configuration types.
//!
//! A [`ServerConfig`] is built once, validated by
//! [`Server::new`](crate::Server::new), and never mutated afterwards. Use the
//! builder for programmatic construction, or start the builder from a TOML or
//! JSON file with [`ServerConfigBuilder::from_file`].
//!
//! # Example
//!
//! ```rust
//! use userapi_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .address("127.0.0.1:8080")
//!     .insecure_http(true)
//!     .shutdown_timeout(Some(Duration::from_secs(30)))
//!     .build();
//!
//! assert_eq!(config.address(), "127.0.0.1:8080");
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global::BoxedTracer;
use serde::Deserialize;

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "localhost:8080";

/// Default timeout for reading request headers, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Default service title reported in logs.
pub const DEFAULT_TITLE: &str = "Swaggerの例";

/// Default service version reported in logs.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Server configuration.
///
/// TLS is the default transport; set [`insecure_http`](ServerConfigBuilder::insecure_http)
/// to serve plaintext. Use [`ServerConfig::builder()`] to construct instances.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address (`host:port`, hostnames allowed)
    address: String,

    /// Verbose logging and diagnostic endpoints
    debug: bool,

    /// Serve plaintext HTTP instead of TLS
    insecure_http: bool,

    /// PEM certificate chain used when TLS is enabled
    tls_cert_file: Option<PathBuf>,

    /// PEM private key used when TLS is enabled
    tls_key_file: Option<PathBuf>,

    /// Skip the authentication stage on business routes
    auth_disabled: bool,

    /// Do not register the `/.well-known/*` and `/swagger.json` routes
    well_known_disabled: bool,

    /// Token issuer consulted by the authentication stage
    token_url: Option<String>,

    /// Tracer used to open one span per business request
    tracer: Option<Arc<BoxedTracer>>,

    /// Opt-in upper bound on handler execution (None = handlers run to completion)
    request_timeout: Option<Duration>,

    /// Upper bound on reading request headers
    read_timeout: Duration,

    /// Drain deadline during shutdown (None = wait for every connection)
    shutdown_timeout: Option<Duration>,

    /// Service title reported in logs
    title: String,

    /// Service version reported in logs
    version: String,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("debug", &self.debug)
            .field("insecure_http", &self.insecure_http)
            .field("tls_cert_file", &self.tls_cert_file)
            .field("tls_key_file", &self.tls_key_file)
            .field("auth_disabled", &self.auth_disabled)
            .field("well_known_disabled", &self.well_known_disabled)
            .field("token_url", &self.token_url)
            .field("tracer", &self.tracer.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("title", &self.title)
            .field("version", &self.version)
            .finish()
    }
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the listen address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns whether debug mode is enabled.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns whether the server serves plaintext HTTP.
    #[must_use]
    pub fn insecure_http(&self) -> bool {
        self.insecure_http
    }

    /// Returns whether the server terminates TLS itself.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        !self.insecure_http
    }

    /// Returns the TLS certificate path, if configured.
    #[must_use]
    pub fn tls_cert_file(&self) -> Option<&Path> {
        self.tls_cert_file.as_deref()
    }

    /// Returns the TLS private key path, if configured.
    #[must_use]
    pub fn tls_key_file(&self) -> Option<&Path> {
        self.tls_key_file.as_deref()
    }

    /// Returns whether authentication is disabled.
    #[must_use]
    pub fn auth_disabled(&self) -> bool {
        self.auth_disabled
    }

    /// Returns whether the well-known endpoints are disabled.
    #[must_use]
    pub fn well_known_disabled(&self) -> bool {
        self.well_known_disabled
    }

    /// Returns the token issuer URL, if configured.
    #[must_use]
    pub fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref()
    }

    /// Returns the tracer handle, if configured.
    #[must_use]
    pub fn tracer(&self) -> Option<&Arc<BoxedTracer>> {
        self.tracer.as_ref()
    }

    /// Returns the handler timeout, if one was opted into.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Returns the header read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the drain deadline, if configured.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout
    }

    /// Returns the service title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Checks that the configuration can be served.
    ///
    /// TLS without both a certificate and a key is rejected here instead of
    /// failing later at the first handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] describing the first problem found.
    pub fn validate(&self) -> ServerResult<()> {
        let (host, port) = self
            .address
            .rsplit_once(':')
            .ok_or_else(|| ServerError::config(format!("address '{}' has no port", self.address)))?;

        if host.is_empty() && port.is_empty() {
            return Err(ServerError::config("address is required"));
        }

        if port.parse::<u16>().is_err() {
            return Err(ServerError::config(format!(
                "address '{}' has an invalid port",
                self.address
            )));
        }

        if self.tls_enabled() {
            match (&self.tls_cert_file, &self.tls_key_file) {
                (Some(_), Some(_)) => {}
                (None, _) => {
                    return Err(ServerError::config(
                        "TLS is enabled but tls_cert_file is not set (set insecure_http to serve plaintext)",
                    ))
                }
                (_, None) => {
                    return Err(ServerError::config(
                        "TLS is enabled but tls_key_file is not set (set insecure_http to serve plaintext)",
                    ))
                }
            }
        }

        if let Some(url) = &self.token_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ServerError::config(
                    "token_url must start with http:// or https://",
                ));
            }
        }

        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ServerError::config("request_timeout must be greater than zero"));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// On-disk representation accepted by [`ServerConfigBuilder::from_file`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    address: Option<String>,
    debug: Option<bool>,
    insecure_http: Option<bool>,
    tls_cert_file: Option<PathBuf>,
    tls_key_file: Option<PathBuf>,
    auth_disabled: Option<bool>,
    well_known_disabled: Option<bool>,
    token_url: Option<String>,
    request_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

/// Builder for [`ServerConfig`].
///
/// Provides a fluent interface for constructing server configuration.
#[derive(Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl fmt::Debug for ServerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                address: DEFAULT_ADDRESS.to_string(),
                debug: false,
                insecure_http: false,
                tls_cert_file: None,
                tls_key_file: None,
                auth_disabled: false,
                well_known_disabled: false,
                token_url: None,
                tracer: None,
                request_timeout: None,
                read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
                shutdown_timeout: None,
                title: DEFAULT_TITLE.to_string(),
                version: DEFAULT_VERSION.to_string(),
            },
        }
    }

    /// Starts a builder from a TOML or JSON file.
    ///
    /// Keys left out of the file keep their defaults, so the returned builder
    /// can still be adjusted (for example by command-line flags).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the file cannot be read, has an
    /// unsupported extension, or fails to parse.
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let file: FileConfig = match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid TOML: {e}")))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid JSON: {e}")))?,
            _ => {
                return Err(ServerError::config(format!(
                    "unsupported config format: {extension}"
                )))
            }
        };

        Ok(Self::new().apply_file(file))
    }

    fn apply_file(mut self, file: FileConfig) -> Self {
        let config = &mut self.config;
        if let Some(address) = file.address {
            config.address = address;
        }
        if let Some(debug) = file.debug {
            config.debug = debug;
        }
        if let Some(insecure) = file.insecure_http {
            config.insecure_http = insecure;
        }
        if file.tls_cert_file.is_some() {
            config.tls_cert_file = file.tls_cert_file;
        }
        if file.tls_key_file.is_some() {
            config.tls_key_file = file.tls_key_file;
        }
        if let Some(disabled) = file.auth_disabled {
            config.auth_disabled = disabled;
        }
        if let Some(disabled) = file.well_known_disabled {
            config.well_known_disabled = disabled;
        }
        if file.token_url.is_some() {
            config.token_url = file.token_url;
        }
        if let Some(secs) = file.request_timeout_secs {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.shutdown_timeout_secs {
            config.shutdown_timeout = Some(Duration::from_secs(secs));
        }
        self
    }

    /// Sets the listen address (e.g., "0.0.0.0:8080", "localhost:3000").
    #[must_use]
    pub fn address(mut self, addr: impl Into<String>) -> Self {
        self.config.address = addr.into();
        self
    }

    /// Enables verbose logging and the `/debug/routes` endpoint.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Serves plaintext HTTP instead of TLS.
    #[must_use]
    pub fn insecure_http(mut self, insecure: bool) -> Self {
        self.config.insecure_http = insecure;
        self
    }

    /// Sets the PEM certificate chain path.
    #[must_use]
    pub fn tls_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls_cert_file = Some(path.into());
        self
    }

    /// Sets the PEM private key path.
    #[must_use]
    pub fn tls_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls_key_file = Some(path.into());
        self
    }

    /// Disables the authentication stage.
    #[must_use]
    pub fn auth_disabled(mut self, disabled: bool) -> Self {
        self.config.auth_disabled = disabled;
        self
    }

    /// Disables the well-known and raw schema endpoints.
    ///
    /// `/healthz` is registered regardless.
    #[must_use]
    pub fn well_known_disabled(mut self, disabled: bool) -> Self {
        self.config.well_known_disabled = disabled;
        self
    }

    /// Sets the token issuer URL.
    #[must_use]
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.token_url = Some(url.into());
        self
    }

    /// Sets the tracer used for per-request spans.
    #[must_use]
    pub fn tracer(mut self, tracer: BoxedTracer) -> Self {
        self.config.tracer = Some(Arc::new(tracer));
        self
    }

    /// Bounds handler execution. On expiry the handler is cancelled and the
    /// client receives 504.
    ///
    /// Off by default: handlers, including those in flight during a drain,
    /// always run to completion unless this is set.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the header read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets a drain deadline for graceful shutdown.
    ///
    /// Without one, shutdown waits for every in-flight request.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the title and version reported when serving starts.
    #[must_use]
    pub fn service_info(mut self, title: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.title = title.into();
        self.config.version = version.into();
        self
    }

    /// Builds the [`ServerConfig`] with the configured values.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
