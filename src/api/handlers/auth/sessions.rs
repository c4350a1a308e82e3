//! Session listing and revocation for the signed-in user.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::types::{ErrorResponse, MessageResponse, SessionsResponse};
use crate::{
    api::middleware::Authenticated,
    auth::{AuthError, AuthService},
};

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Active sessions", body = SessionsResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn list_sessions(
    auth: Authenticated,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    match service.get_user_sessions(auth.user_id).await {
        Ok(sessions) => (StatusCode::OK, Json(SessionsResponse { sessions })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No such session for this user", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn revoke_session(
    auth: Authenticated,
    service: Extension<Arc<AuthService>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // An unparseable id cannot name one of the caller's sessions.
    let Ok(session_id) = Uuid::parse_str(id.trim()) else {
        return AuthError::SessionNotFound.into_response();
    };

    match service.revoke_session(auth.user_id, session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("session revoked successfully")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
