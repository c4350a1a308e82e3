use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::{
    error::missing_payload,
    types::{ErrorResponse, MessageResponse, ResendVerificationRequest, VerifyEmailRequest},
};
use crate::auth::AuthService;

const RESEND_MESSAGE: &str = "if the account exists and is not verified, a new link has been sent";

#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Invalid, used, or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service.verify_email(&request.token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("email verified successfully")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification resent if applicable", body = MessageResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service.resend_verification(&request.email).await {
        Ok(()) => (StatusCode::OK, Json(MessageResponse::new(RESEND_MESSAGE))).into_response(),
        Err(err) => err.into_response(),
    }
}
