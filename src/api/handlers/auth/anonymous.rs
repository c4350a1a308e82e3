use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::debug;

use super::types::ErrorResponse;
use crate::{
    api::middleware::OptionalAuth,
    auth::{models::AnonymousSession, AuthService},
};

/// Mint an anonymous identity. A bearer header is optional but must be valid when sent.
#[utoipa::path(
    post,
    path = "/v1/auth/anonymous",
    responses(
        (status = 201, description = "Anonymous session created", body = AnonymousSession),
        (status = 401, description = "Invalid bearer token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn create_anonymous(
    OptionalAuth(caller): OptionalAuth,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    if let Some(claims) = caller {
        debug!(sub = %claims.sub, kind = claims.kind.as_str(), "anonymous session requested by token holder");
    }

    match service.create_anonymous_session().await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(err) => err.into_response(),
    }
}
