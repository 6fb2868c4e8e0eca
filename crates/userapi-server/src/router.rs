//! Route table and path matching.
//!
//! Routes are declared with `{name}` placeholders, the form used in the API
//! schema, and translated once at registration into the router's native
//! `:name` form. The table is built before serving starts and never changes
//! afterwards.
//!
//! # Example
//!
//! ```rust
//! use userapi_server::router::translate_path;
//!
//! assert_eq!(translate_path("/user/{user_id}").unwrap(), "/user/:user_id");
//! assert_eq!(translate_path("/healthz").unwrap(), "/healthz");
//! assert!(translate_path("/user/{user_id").is_err());
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::request::Parts;
use http::{Method, Response};
use http_body_util::Full;
use thiserror::Error;

/// Response type produced by every route.
pub type HttpResponse = Response<Full<Bytes>>;

/// Type-erased route handler.
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// Errors raised while registering a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A `{` without a matching `}` or the reverse.
    #[error("Unbalanced braces in route pattern '{pattern}'")]
    UnbalancedBraces {
        /// Offending pattern
        pattern: String,
    },

    /// A `{` inside another placeholder.
    #[error("Nested placeholder in route pattern '{pattern}'")]
    NestedPlaceholder {
        /// Offending pattern
        pattern: String,
    },

    /// A placeholder with no name, or with a `/` in its name.
    #[error("Invalid placeholder name in route pattern '{pattern}'")]
    InvalidPlaceholder {
        /// Offending pattern
        pattern: String,
    },
}

/// Translates `{name}` placeholders into the native `:name` form.
///
/// Only delimiters change; every other character passes through.
///
/// # Errors
///
/// Returns a [`RouteError`] for unbalanced or nested braces, empty names, and
/// names containing `/`.
pub fn translate_path(pattern: &str) -> Result<String, RouteError> {
    let mut out = String::with_capacity(pattern.len());
    let mut placeholder: Option<usize> = None;

    for c in pattern.chars() {
        match (c, placeholder) {
            ('{', None) => {
                out.push(':');
                placeholder = Some(0);
            }
            ('{', Some(_)) => {
                return Err(RouteError::NestedPlaceholder {
                    pattern: pattern.to_string(),
                })
            }
            ('}', Some(0)) => {
                return Err(RouteError::InvalidPlaceholder {
                    pattern: pattern.to_string(),
                })
            }
            ('}', Some(_)) => placeholder = None,
            ('}', None) => {
                return Err(RouteError::UnbalancedBraces {
                    pattern: pattern.to_string(),
                })
            }
            ('/', Some(_)) => {
                return Err(RouteError::InvalidPlaceholder {
                    pattern: pattern.to_string(),
                })
            }
            (c, Some(len)) => {
                out.push(c);
                placeholder = Some(len + 1);
            }
            (c, None) => out.push(c),
        }
    }

    if placeholder.is_some() {
        return Err(RouteError::UnbalancedBraces {
            pattern: pattern.to_string(),
        });
    }

    Ok(out)
}

/// Path parameters captured by a match, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Returns a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a handler receives: the request head and the captured parameters.
#[derive(Debug)]
pub struct RouteRequest {
    /// Request method, URI, headers
    pub head: Parts,
    /// Captured path parameters
    pub params: PathParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse_segments(native: &str) -> Vec<Segment> {
    native
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl Route {
    fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = Vec::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(PathParams(params))
    }
}

/// A successful lookup.
pub struct RouteMatch<'a> {
    handler: &'a RouteHandler,
    params: PathParams,
}

impl RouteMatch<'_> {
    /// Returns the captured parameters.
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Invokes the matched handler.
    pub fn call(self, head: Parts) -> BoxFuture<'static, HttpResponse> {
        (self.handler)(RouteRequest {
            head,
            params: self.params,
        })
    }
}

/// Ordered, immutable route table.
///
/// The first registered route that matches wins.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| format!("{} {}", r.method, r.pattern)))
            .finish()
    }
}

impl RouteTable {
    /// Creates an empty builder.
    #[must_use]
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Finds the handler for a request.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(path).map(|params| RouteMatch {
                    handler: &route.handler,
                    params,
                })
            })
    }

    /// Lists registered routes as `(method, native pattern)`.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.pattern.as_str()))
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder for [`RouteTable`].
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
}

impl RouteTableBuilder {
    /// Registers a route, translating `{name}` placeholders.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] if the pattern cannot be translated.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: RouteHandler,
    ) -> Result<&mut Self, RouteError> {
        let native = translate_path(pattern)?;
        tracing::debug!(%method, pattern = %native, "Registered route");
        self.routes.push(Route {
            method,
            segments: parse_segments(&native),
            pattern: native,
            handler,
        });
        Ok(self)
    }

    /// Lists the routes registered so far.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.pattern.as_str()))
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use http_body_util::BodyExt;

    fn named(name: &'static str) -> RouteHandler {
        Arc::new(move |req: RouteRequest| {
            Box::pin(async move {
                let body = format!("{name}:{}", req.params.get("id").unwrap_or("-"));
                Response::new(Full::new(Bytes::from(body)))
            })
        })
    }

    fn head(uri: &str) -> Parts {
        Request::get(uri).body(()).unwrap().into_parts().0
    }

    async fn body_of(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_translate_user_path() {
        assert_eq!(translate_path("/user/{user_id}").unwrap(), "/user/:user_id");
    }

    #[test]
    fn test_translate_passthrough() {
        assert_eq!(translate_path("/healthz").unwrap(), "/healthz");
        assert_eq!(
            translate_path("/.well-known/schema-discovery").unwrap(),
            "/.well-known/schema-discovery"
        );
        assert_eq!(translate_path("").unwrap(), "");
    }

    #[test]
    fn test_translate_multiple_placeholders() {
        assert_eq!(
            translate_path("/org/{org_id}/user/{userId2}").unwrap(),
            "/org/:org_id/user/:userId2"
        );
    }

    #[test]
    fn test_translate_rejects_bad_patterns() {
        assert!(matches!(
            translate_path("/user/{user_id"),
            Err(RouteError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            translate_path("/user/user_id}"),
            Err(RouteError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            translate_path("/user/{a{b}}"),
            Err(RouteError::NestedPlaceholder { .. })
        ));
        assert!(matches!(
            translate_path("/user/{}"),
            Err(RouteError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(
            translate_path("/user/{a/b}"),
            Err(RouteError::InvalidPlaceholder { .. })
        ));
    }

    #[test]
    fn test_builder_rejects_bad_pattern() {
        let mut builder = RouteTable::builder();
        assert!(builder.route(Method::GET, "/x/{", named("x")).is_err());
    }

    #[tokio::test]
    async fn test_match_with_param() {
        let mut builder = RouteTable::builder();
        builder.route(Method::GET, "/user/{id}", named("user")).unwrap();
        let table = builder.build();

        let matched = table.match_route(&Method::GET, "/user/123").unwrap();
        assert_eq!(matched.params().get("id"), Some("123"));
        assert_eq!(body_of(matched.call(head("/user/123")).await).await, "user:123");
    }

    #[test]
    fn test_match_misses() {
        let mut builder = RouteTable::builder();
        builder.route(Method::GET, "/user/{id}", named("user")).unwrap();
        let table = builder.build();

        assert!(table.match_route(&Method::POST, "/user/1").is_none());
        assert!(table.match_route(&Method::GET, "/user").is_none());
        assert!(table.match_route(&Method::GET, "/user/1/extra").is_none());
        assert!(table.match_route(&Method::GET, "/users/1").is_none());
    }

    #[test]
    fn test_slashes_ignored() {
        let mut builder = RouteTable::builder();
        builder.route(Method::GET, "/healthz", named("h")).unwrap();
        let table = builder.build();

        assert!(table.match_route(&Method::GET, "/healthz/").is_some());
        assert!(table.match_route(&Method::GET, "healthz").is_some());
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let mut builder = RouteTable::builder();
        builder
            .route(Method::GET, "/user/me", named("literal"))
            .unwrap()
            .route(Method::GET, "/user/{id}", named("param"))
            .unwrap();
        let table = builder.build();

        let me = table.match_route(&Method::GET, "/user/me").unwrap();
        assert_eq!(body_of(me.call(head("/user/me")).await).await, "literal:-");

        let other = table.match_route(&Method::GET, "/user/7").unwrap();
        assert_eq!(body_of(other.call(head("/user/7")).await).await, "param:7");
    }

    #[test]
    fn test_routes_listing() {
        let mut builder = RouteTable::builder();
        builder
            .route(Method::GET, "/user/{user_id}", named("u"))
            .unwrap()
            .route(Method::GET, "/healthz", named("h"))
            .unwrap();
        let table = builder.build();

        let listed: Vec<_> = table.routes().map(|(m, p)| (m.clone(), p.to_string())).collect();
        assert_eq!(
            listed,
            vec![
                (Method::GET, "/user/:user_id".to_string()),
                (Method::GET, "/healthz".to_string()),
            ]
        );
        assert_eq!(table.len(), 2);
        assert!(format!("{table:?}").contains("GET /healthz"));
    }
}
