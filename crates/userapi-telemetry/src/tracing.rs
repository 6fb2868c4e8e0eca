//! OpenTelemetry distributed tracing.
//!
//! [`init_tracing`] installs a global tracer provider exporting over OTLP and
//! the W3C trace context propagator. The server receives a [`BoxedTracer`]
//! from [`tracer`] as its optional tracer handle and opens one span per
//! business request, parented on whatever `traceparent` the caller sent.
//!
//! Sampling is parent-based: a request that arrives with a sampled parent is
//! always recorded, and root spans fall back to `sample_ratio`.
//!
//! ```rust,ignore
//! use userapi_telemetry::{init_tracing, tracer, TracingConfig};
//!
//! init_tracing(&TracingConfig::with_endpoint("http://collector:4317"))?;
//! let handle = tracer("userapi");
//! ```

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::Extractor;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, TracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Default OTLP gRPC collector endpoint.
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Install nothing when `false`.
    pub enabled: bool,
    /// OTLP gRPC endpoint.
    pub otlp_endpoint: String,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// `service.version` resource attribute.
    pub service_version: String,
    /// Fraction of root spans to record, clamped to `0.0..=1.0`.
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: "userapi".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            sample_ratio: 1.0,
        }
    }
}

impl TracingConfig {
    /// Exports to `endpoint` with every other field defaulted.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            otlp_endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    fn sampler(&self) -> Sampler {
        let ratio = self.sample_ratio.clamp(0.0, 1.0);
        let root = if ratio >= 1.0 {
            Sampler::AlwaysOn
        } else if ratio <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(ratio)
        };
        Sampler::ParentBased(Box::new(root))
    }

    fn resource(&self) -> Resource {
        Resource::new([
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
        ])
    }
}

/// Installs the global tracer provider and propagator.
///
/// Returns the provider, or `None` when tracing is disabled. The global
/// registry keeps its own reference, so dropping the return value does not
/// stop export; call [`shutdown_tracing`] to flush.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TracingConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_sampler(config.sampler())
        .with_resource(config.resource())
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    ::tracing::info!(
        endpoint = %config.otlp_endpoint,
        service = %config.service_name,
        ratio = config.sample_ratio,
        "OpenTelemetry export enabled"
    );
    Ok(Some(provider))
}

/// Flushes pending spans and shuts the global provider down. Blocks.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

/// Returns a tracer from the global provider.
///
/// Before [`init_tracing`] this is a no-op tracer, so spans cost nothing.
#[must_use]
pub fn tracer(name: &'static str) -> BoxedTracer {
    global::tracer(name)
}

/// Extracts the caller's trace context from request headers.
pub fn extract_context(headers: &http::HeaderMap) -> opentelemetry::Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Read-only propagation carrier over `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}
