//! User API - Entry point
//!
//! Loads configuration from an optional file, the environment and the
//! command line (in increasing precedence), then serves until SIGHUP, SIGINT
//! or SIGTERM.

mod models;
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use tracing::info;

use userapi_server::{LifecycleError, Server, ServerConfig, ServerConfigBuilder, ShutdownHooks};
use userapi_telemetry::{
    init_logging, init_tracing, shutdown_tracing, tracer, LogConfig, TracingConfig,
};

use crate::service::StubService;

/// User API server.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE", env = "USERAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long, env = "USERAPI_ADDRESS")]
    address: Option<String>,

    /// Verbose logging and /debug/routes
    #[arg(
        long,
        env = "USERAPI_DEBUG",
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    debug: Option<bool>,

    /// Serve plaintext HTTP instead of TLS
    #[arg(
        long,
        env = "USERAPI_INSECURE_HTTP",
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    insecure_http: Option<bool>,

    /// PEM certificate chain
    #[arg(long, value_name = "FILE", env = "USERAPI_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, value_name = "FILE", env = "USERAPI_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Skip the authentication stage
    #[arg(
        long,
        env = "USERAPI_AUTH_DISABLED",
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    auth_disabled: Option<bool>,

    /// Do not serve /.well-known/* and /swagger.json
    #[arg(
        long,
        env = "USERAPI_WELL_KNOWN_DISABLED",
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    well_known_disabled: Option<bool>,

    /// Token issuer URL
    #[arg(long, env = "USERAPI_TOKEN_URL")]
    token_url: Option<String>,

    /// OpenTelemetry collector endpoint; tracing is off when unset
    #[arg(long, env = "USERAPI_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

impl Args {
    /// Layers command-line values over the file (or default) configuration.
    ///
    /// Flags given without a value mean `true`; `--debug=false` (or
    /// `USERAPI_DEBUG=false`) turns off a value set by the file.
    fn into_builder(self) -> anyhow::Result<(ServerConfigBuilder, Option<String>)> {
        let mut builder = match &self.config {
            Some(path) => ServerConfigBuilder::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::builder(),
        };

        if let Some(address) = self.address {
            builder = builder.address(address);
        }
        if let Some(debug) = self.debug {
            builder = builder.debug(debug);
        }
        if let Some(insecure_http) = self.insecure_http {
            builder = builder.insecure_http(insecure_http);
        }
        if let Some(cert) = self.tls_cert {
            builder = builder.tls_cert_file(cert);
        }
        if let Some(key) = self.tls_key {
            builder = builder.tls_key_file(key);
        }
        if let Some(auth_disabled) = self.auth_disabled {
            builder = builder.auth_disabled(auth_disabled);
        }
        if let Some(well_known_disabled) = self.well_known_disabled {
            builder = builder.well_known_disabled(well_known_disabled);
        }
        if let Some(url) = self.token_url {
            builder = builder.token_url(url);
        }

        Ok((builder, self.otlp_endpoint))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let (builder, otlp_endpoint) = args.into_builder()?;
    let mut builder = builder.service_info("User API", env!("CARGO_PKG_VERSION"));

    let debug = builder.clone().build().debug();
    init_logging(&LogConfig::for_debug(debug))?;

    let mut hooks = ShutdownHooks::new();
    if let Some(endpoint) = otlp_endpoint {
        init_tracing(&TracingConfig::with_endpoint(endpoint))?;
        builder = builder.tracer(tracer("userapi"));
        hooks = hooks.on_shutdown("flush_traces", || async {
            tokio::task::spawn_blocking(shutdown_tracing)
                .await
                .map_err(|e| LifecycleError::with_source("failed to flush traces", e))
        });
    }

    let server = Server::new(Arc::new(StubService), builder.build())
        .context("invalid server configuration")?;

    info!(state = %server.state(), "Starting User API");
    server.run_with_signal_handler(hooks).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "userapi",
            "--address",
            "127.0.0.1:9000",
            "--insecure-http",
            "--auth-disabled",
            "--token-url",
            "https://issuer/token",
        ])
        .unwrap();

        let (builder, otlp) = args.into_builder().unwrap();
        let config = builder.build();
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert!(config.insecure_http());
        assert!(config.auth_disabled());
        assert!(!config.well_known_disabled());
        assert_eq!(config.token_url(), Some("https://issuer/token"));
        assert!(otlp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_paths() {
        let args = Args::try_parse_from([
            "userapi",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
        ])
        .unwrap();

        let (builder, _) = args.into_builder().unwrap();
        let config = builder.build();
        assert!(config.tls_enabled());
        assert!(config.tls_cert_file().is_some());
        assert!(config.tls_key_file().is_some());
    }

    #[test]
    fn test_cli_turns_off_file_flags() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "address = \"127.0.0.1:9000\"\ninsecure_http = true\ndebug = true\nauth_disabled = true"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let (builder, _) = Args::try_parse_from([
            "userapi",
            "--config",
            path,
            "--insecure-http=false",
            "--debug",
            "no",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
        ])
        .unwrap()
        .into_builder()
        .unwrap();
        let config = builder.build();
        assert!(!config.insecure_http());
        assert!(!config.debug());
        assert!(config.auth_disabled());
        assert!(config.validate().is_ok());

        let (builder, _) = Args::try_parse_from(["userapi", "--config", path, "--debug"])
            .unwrap()
            .into_builder()
            .unwrap();
        assert!(builder.build().debug());
    }

    #[test]
    fn test_missing_config_file() {
        let args =
            Args::try_parse_from(["userapi", "--config", "/nonexistent/userapi.toml"]).unwrap();
        assert!(args.into_builder().is_err());
    }
}
