//! Placeholder business logic.
//!
//! Every lookup succeeds with the same fixed user. Replace [`StubService`]
//! with a real implementation of [`Service`] to back the API with data.

use async_trait::async_trait;
use http::StatusCode;
use userapi_server::{ApiResponse, GetUserByUserIdParams, Service};

use crate::models::User;

/// Id returned for every lookup.
pub const STUB_USER_ID: i64 = 9999;

/// Name returned for every lookup.
pub const STUB_USER_NAME: &str = "OK!!!";

/// Always-healthy service answering every lookup with a fixed user.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubService;

#[async_trait]
impl Service for StubService {
    fn healthy(&self) -> bool {
        true
    }

    async fn get_user_by_user_id(&self, params: GetUserByUserIdParams) -> ApiResponse {
        tracing::debug!(user_id = params.user_id, "Looking up user");
        let user = User {
            id: STUB_USER_ID,
            name: STUB_USER_NAME.to_string(),
        };
        ApiResponse::json(StatusCode::OK, &user)
    }
}
