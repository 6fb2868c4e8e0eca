//! JSON response builders shared by every route.

use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::router::HttpResponse;

/// Builds a response with a raw JSON body.
#[must_use]
pub fn raw_json(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Serializes `body` into a JSON response.
///
/// A value that fails to serialize becomes a 500.
#[must_use]
pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_json(status, bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                "Failed to serialize response",
            )
        }
    }
}

/// Standard error body: `{"error":{"code":..,"message":..}}`.
#[must_use]
pub fn error(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message
        }
    });
    raw_json(status, body.to_string())
}

/// 404 body: `{"error":"Not Found","path":..}`.
#[must_use]
pub fn not_found(path: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path
    });
    raw_json(StatusCode::NOT_FOUND, body.to_string())
}
