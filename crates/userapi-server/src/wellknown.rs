//! Operational endpoints: health, schema discovery, raw schema.

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::health::HealthMonitor;
use crate::response;
use crate::router::{RouteError, RouteHandler, RouteRequest, RouteTableBuilder};

/// The API schema served at `/swagger.json`.
pub static SWAGGER_JSON: &[u8] = include_bytes!("../schema/swagger.json");

/// Body of `/.well-known/schema-discovery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiscovery {
    /// Where the schema is served
    pub schema_url: String,
    /// Schema dialect
    pub schema_type: String,
    /// Documentation UI, empty when none
    pub ui_url: String,
}

impl Default for SchemaDiscovery {
    fn default() -> Self {
        Self {
            schema_url: "/swagger.json".to_string(),
            schema_type: "swagger-2.0".to_string(),
            ui_url: String::new(),
        }
    }
}

fn health_handler(health: &HealthMonitor) -> RouteHandler {
    let health = health.clone();
    Arc::new(move |_: RouteRequest| {
        let response = health.response();
        Box::pin(async move { response })
    })
}

fn schema_discovery_handler() -> RouteHandler {
    Arc::new(|_: RouteRequest| {
        Box::pin(async { response::json(StatusCode::OK, &SchemaDiscovery::default()) })
    })
}

fn swagger_handler() -> RouteHandler {
    Arc::new(|_: RouteRequest| {
        Box::pin(async { response::raw_json(StatusCode::OK, Bytes::from_static(SWAGGER_JSON)) })
    })
}

/// Registers the operational routes.
///
/// `/healthz` is always present; the rest only unless `well_known_disabled`.
pub(crate) fn register(
    routes: &mut RouteTableBuilder,
    health: &HealthMonitor,
    well_known_disabled: bool,
) -> Result<(), RouteError> {
    if !well_known_disabled {
        routes
            .route(
                Method::GET,
                "/.well-known/schema-discovery",
                schema_discovery_handler(),
            )?
            .route(Method::GET, "/.well-known/health", health_handler(health))?
            .route(Method::GET, "/swagger.json", swagger_handler())?;
    }
    routes.route(Method::GET, "/healthz", health_handler(health))?;
    Ok(())
}

/// One entry of `/debug/routes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// HTTP method
    pub method: String,
    /// Native route pattern
    pub path: String,
}

/// Registers `/debug/routes`, listing every route including itself.
pub(crate) fn register_debug(routes: &mut RouteTableBuilder) -> Result<(), RouteError> {
    const PATH: &str = "/debug/routes";

    let mut listing: Vec<RouteInfo> = routes
        .routes()
        .map(|(method, path)| RouteInfo {
            method: method.to_string(),
            path: path.to_string(),
        })
        .collect();
    listing.push(RouteInfo {
        method: Method::GET.to_string(),
        path: PATH.to_string(),
    });
    let listing = Arc::new(listing);

    let handler: RouteHandler = Arc::new(move |_: RouteRequest| {
        let listing = Arc::clone(&listing);
        Box::pin(async move { response::json(StatusCode::OK, listing.as_slice()) })
    });
    routes.route(Method::GET, PATH, handler)?;
    Ok(())
}
