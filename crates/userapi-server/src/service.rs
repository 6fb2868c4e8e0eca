//! The business-logic boundary.
//!
//! The server never interprets business results. A [`Service`] returns an
//! [`ApiResponse`] and the server writes its status and JSON body verbatim.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use userapi_server::{ApiResponse, GetUserByUserIdParams, Service};
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl Service for Fixed {
//!     fn healthy(&self) -> bool {
//!         true
//!     }
//!
//!     async fn get_user_by_user_id(&self, params: GetUserByUserIdParams) -> ApiResponse {
//!         ApiResponse::json(StatusCode::OK, &serde_json::json!({ "id": params.user_id }))
//!     }
//! }
//! ```

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;

use crate::response;
use crate::router::HttpResponse;

/// Bound parameters of `GET /user/{user_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetUserByUserIdParams {
    /// Path parameter `user_id`
    pub user_id: i64,
}

/// Status and JSON body produced by a service operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// JSON body, written as-is
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Creates a response from a status and a JSON value.
    #[must_use]
    pub fn new(status: StatusCode, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Creates a response by serializing `body`.
    ///
    /// A value that cannot be represented as JSON yields a 500.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self::new(status, value),
            Err(e) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": {
                        "code": "SERIALIZATION_ERROR",
                        "message": e.to_string()
                    }
                }),
            ),
        }
    }

    pub(crate) fn into_http(self) -> HttpResponse {
        response::json(self.status, &self.body)
    }
}

/// Business operations and the readiness probe.
///
/// Implementations are shared across connection tasks, so they must be
/// `Send + Sync`.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Whether the service can take traffic. Called on every health query;
    /// must be cheap and must not block.
    fn healthy(&self) -> bool;

    /// `GET /user/{user_id}`.
    async fn get_user_by_user_id(&self, params: GetUserByUserIdParams) -> ApiResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde::ser::Error as _;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("nope"))
        }
    }

    #[test]
    fn test_json_response() {
        #[derive(Serialize)]
        struct User {
            id: i64,
            name: &'static str,
        }

        let response = ApiResponse::json(StatusCode::OK, &User { id: 1, name: "a" });
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, serde_json::json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn test_json_serialization_failure() {
        let response = ApiResponse::json(StatusCode::OK, &Unserializable);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["error"]["code"], "SERIALIZATION_ERROR");
    }

    #[tokio::test]
    async fn test_into_http_is_verbatim() {
        let http = ApiResponse::new(StatusCode::IM_A_TEAPOT, serde_json::json!(["x"])).into_http();
        assert_eq!(http.status(), StatusCode::IM_A_TEAPOT);
        let bytes = http.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"["x"]"#);
    }
}
