//! Request pipeline for business routes.
//!
//! Every business handler is wrapped, outermost first, in:
//!
//! ```text
//! Logging → Span → Auth → [Timeout] → Panic recovery → Handler
//! ```
//!
//! The timeout stage exists only when a request timeout is configured; by
//! default a handler always runs to completion and its response is sent
//! unchanged, during a drain too. Operational routes (health, schema) are not
//! wrapped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use http::StatusCode;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::KeyValue;
use userapi_telemetry::extract_context;

use crate::config::ServerConfig;
use crate::response;
use crate::router::{HttpResponse, RouteHandler, RouteRequest};

#[derive(Clone)]
pub(crate) struct Pipeline {
    tracer: Option<Arc<BoxedTracer>>,
    auth_enabled: bool,
    token_url: Option<Arc<str>>,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub(crate) fn from_config(config: &ServerConfig) -> Self {
        Self {
            tracer: config.tracer().cloned(),
            auth_enabled: !config.auth_disabled(),
            token_url: config.token_url().map(Arc::from),
            timeout: config.request_timeout(),
        }
    }

    /// Wraps `handler` for the named operation.
    pub(crate) fn wrap(&self, operation: &'static str, handler: RouteHandler) -> RouteHandler {
        let pipeline = self.clone();
        Arc::new(move |request: RouteRequest| {
            let pipeline = pipeline.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move { pipeline.process(operation, &handler, request).await })
        })
    }

    async fn process(
        &self,
        operation: &'static str,
        handler: &RouteHandler,
        request: RouteRequest,
    ) -> HttpResponse {
        let start = Instant::now();
        let method = request.head.method.clone();
        let path = request.head.uri.path().to_string();

        let mut span = self.tracer.as_ref().map(|tracer| {
            let parent = extract_context(&request.head.headers);
            tracer.start_with_context(operation, &parent)
        });

        if self.auth_enabled {
            // Inert stage: requests are not checked against the issuer.
            tracing::trace!(
                operation,
                token_url = self.token_url.as_deref().unwrap_or(""),
                "Authentication passed"
            );
        }

        let response = self.invoke(operation, handler, request).await;
        let status = response.status();

        if let Some(span) = span.as_mut() {
            span.set_attribute(KeyValue::new(
                "http.response.status_code",
                i64::from(status.as_u16()),
            ));
            if status.is_server_error() {
                span.set_status(Status::error(status.to_string()));
            }
            span.end();
        }

        tracing::info!(
            operation,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Request completed"
        );

        response
    }

    async fn invoke(
        &self,
        operation: &'static str,
        handler: &RouteHandler,
        request: RouteRequest,
    ) -> HttpResponse {
        let guarded = AssertUnwindSafe(handler(request)).catch_unwind();

        let outcome = match self.timeout {
            None => Ok(guarded.await),
            Some(limit) => tokio::time::timeout(limit, guarded).await,
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                tracing::error!(operation, "Handler panicked");
                response::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                )
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.map_or(0, |t| t.as_millis()),
                    "Handler timed out"
                );
                response::error(
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    "Request timed out",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request, Response};
    use http_body_util::{BodyExt, Full};

    use crate::router::PathParams;

    fn pipeline(timeout: Option<Duration>) -> Pipeline {
        let config = ServerConfig::builder()
            .insecure_http(true)
            .request_timeout(timeout)
            .build();
        Pipeline::from_config(&config)
    }

    fn request() -> RouteRequest {
        RouteRequest {
            head: Request::get("/user/1").body(()).unwrap().into_parts().0,
            params: PathParams::default(),
        }
    }

    fn handler<F>(f: F) -> RouteHandler
    where
        F: Fn() -> HttpResponse + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Arc::new(move |_req: RouteRequest| {
            let f = Arc::clone(&f);
            Box::pin(async move { f() })
        })
    }

    async fn error_code(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["error"]["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_passes_response_through() {
        let wrapped = pipeline(None).wrap(
            "op",
            handler(|| {
                let mut response = Response::new(Full::new(Bytes::from_static(b"{}")));
                *response.status_mut() = StatusCode::CREATED;
                response
            }),
        );

        let response = wrapped(request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let wrapped = pipeline(None).wrap("op", handler(|| panic!("handler bug")));

        let response = wrapped(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_code(response).await, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_timeout_becomes_504() {
        let slow: RouteHandler = Arc::new(|_req: RouteRequest| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Response::new(Full::new(Bytes::new()))
            })
        });
        let wrapped = pipeline(Some(Duration::from_millis(20))).wrap("op", slow);

        let response = wrapped(request()).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_code(response).await, "TIMEOUT");
    }

    #[tokio::test]
    async fn test_slow_handler_runs_to_completion_by_default() {
        let slow: RouteHandler = Arc::new(|_req: RouteRequest| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let mut response = Response::new(Full::new(Bytes::from_static(b"{}")));
                *response.status_mut() = StatusCode::ACCEPTED;
                response
            })
        });
        let wrapped = pipeline(None).wrap("op", slow);

        let response = wrapped(request()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_with_tracer_configured() {
        let config = ServerConfig::builder()
            .insecure_http(true)
            .tracer(userapi_telemetry::tracer("test"))
            .build();
        let wrapped = Pipeline::from_config(&config).wrap(
            "op",
            handler(|| Response::new(Full::new(Bytes::from_static(b"ok")))),
        );

        let response = wrapped(request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
