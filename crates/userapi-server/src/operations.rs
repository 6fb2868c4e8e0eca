//! Business route registration and parameter binding.

use std::sync::Arc;

use http::{Method, StatusCode};

use crate::middleware::Pipeline;
use crate::response;
use crate::router::{HttpResponse, RouteError, RouteHandler, RouteRequest, RouteTableBuilder};
use crate::service::{GetUserByUserIdParams, Service};

/// Path of the user lookup operation.
pub const GET_USER_BY_USER_ID_PATH: &str = "/user/{user_id}";

/// Binds `GetUserByUserIdParams` from the captured path.
fn bind_get_user_by_user_id(request: &RouteRequest) -> Result<GetUserByUserIdParams, HttpResponse> {
    let raw = request.params.get("user_id").unwrap_or_default();
    raw.parse::<i64>()
        .map(|user_id| GetUserByUserIdParams { user_id })
        .map_err(|e| {
            response::error(
                StatusCode::BAD_REQUEST,
                "INVALID_PARAMETER",
                &format!("Invalid format for parameter user_id: {e}"),
            )
        })
}

fn get_user_by_user_id(service: Arc<dyn Service>) -> RouteHandler {
    Arc::new(move |request: RouteRequest| {
        let service = Arc::clone(&service);
        Box::pin(async move {
            match bind_get_user_by_user_id(&request) {
                Ok(params) => service.get_user_by_user_id(params).await.into_http(),
                Err(rejection) => rejection,
            }
        })
    })
}

/// Registers every business route, wrapped in the request pipeline.
pub(crate) fn register(
    routes: &mut RouteTableBuilder,
    service: &Arc<dyn Service>,
    pipeline: &Pipeline,
) -> Result<(), RouteError> {
    routes.route(
        Method::GET,
        GET_USER_BY_USER_ID_PATH,
        pipeline.wrap("get_user_by_user_id", get_user_by_user_id(Arc::clone(service))),
    )?;
    Ok(())
}
