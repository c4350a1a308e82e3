//! Forgot, reset, and change password.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::{
    error::missing_payload,
    types::{
        ChangePasswordRequest, ErrorResponse, ForgotPasswordRequest, MessageResponse,
        ResetPasswordRequest,
    },
};
use crate::{api::middleware::Authenticated, auth::AuthService};

// Same body whether or not the email exists.
const FORGOT_PASSWORD_MESSAGE: &str = "if the email exists, a password reset link has been sent";

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service.forgot_password(&request.email).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Invalid or expired reset token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service
        .reset_password(request.token.trim(), &request.new_password)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("password reset successful")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Wrong current password or missing token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    auth: Authenticated,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service
        .change_password(
            auth.user_id,
            &request.current_password,
            &request.new_password,
        )
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("password changed successfully")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
