//! Login, logout, and refresh.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::{
    error::missing_payload,
    types::{ErrorResponse, LoginRequest, LogoutRequest, MessageResponse, RefreshTokenRequest},
};
use crate::{
    api::middleware::{client_ip, Authenticated},
    auth::{models::DeviceInfo, AuthResponse, AuthService},
};

fn device_info(headers: &HeaderMap, device_id: Option<String>) -> DeviceInfo {
    DeviceInfo {
        device_id: device_id.unwrap_or_default(),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        ip_address: client_ip(headers).unwrap_or_default(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled or email not verified", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    let device = device_info(&headers, request.device_id);
    match service.login(&request.email, &request.password, device).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body(content = LogoutRequest, description = "Omit `session_id` to log out everywhere"),
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 400, description = "Body present but not a valid logout request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    auth: Authenticated,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> impl IntoResponse {
    let request = match LogoutRequest::from_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match service.logout(auth.user_id, request.session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("logout successful")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshTokenRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    if let Err(err) = request.validate() {
        return err.into_response();
    }

    match service.refresh_token(request.refresh_token.trim()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn device_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.2.3"));

        let device = device_info(&headers, Some("laptop".to_string()));
        assert_eq!(device.device_id, "laptop");
        assert_eq!(device.user_agent, "curl/8.0");
        assert_eq!(device.ip_address, "10.1.2.3");

        let device = device_info(&HeaderMap::new(), None);
        assert_eq!(device, DeviceInfo::default());
    }
}
