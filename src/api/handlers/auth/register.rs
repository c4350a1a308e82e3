use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::debug;

use super::{
    error::missing_payload,
    types::{ErrorResponse, RegisterRequest, RegisterResponse},
};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = RegisterResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service
        .register(&request.email, &request.password, &request.name)
        .await
    {
        Ok(user) => {
            debug!(user_id = %user.id, "registration accepted");
            (
                StatusCode::CREATED,
                Json(RegisterResponse {
                    message: "registration successful, please verify your email".to_string(),
                    user_id: user.id,
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}
