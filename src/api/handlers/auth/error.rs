use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use super::types::ErrorResponse;
use crate::auth::AuthError;

pub(crate) fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::UserDisabled | AuthError::UserNotVerified => StatusCode::FORBIDDEN,
        AuthError::SessionNotFound | AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        match &self {
            AuthError::Internal(source) => error!(code = self.code(), "{source:#}"),
            _ => warn!(code = self.code(), "{self}"),
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub(crate) fn missing_payload() -> Response {
    AuthError::Validation("missing payload".to_string()).into_response()
}
