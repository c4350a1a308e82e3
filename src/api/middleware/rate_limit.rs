//! Rate limiting hook.
//!
//! The chain asks a [`RateLimiter`] before any handler runs; the default
//! [`NoopRateLimiter`] lets everything through.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use super::client_ip;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitAction {
    Register,
    Login,
    Refresh,
    PasswordReset,
    VerifyEmail,
    ResendVerification,
    Anonymous,
    Other,
}

impl RateLimitAction {
    /// Classify a request path.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "/v1/auth/register" => Self::Register,
            "/v1/auth/login" => Self::Login,
            "/v1/auth/refresh" => Self::Refresh,
            "/v1/auth/forgot-password" | "/v1/auth/reset-password" => Self::PasswordReset,
            "/v1/auth/verify-email" => Self::VerifyEmail,
            "/v1/auth/resend-verification" => Self::ResendVerification,
            "/v1/auth/anonymous" => Self::Anonymous,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn rate_limit(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let action = RateLimitAction::from_path(request.uri().path());
    let ip = client_ip(request.headers());

    if limiter.check_ip(ip.as_deref(), action) == RateLimitDecision::Limited {
        warn!(?action, ip = ip.as_deref().unwrap_or("unknown"), "rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate limited" })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Register),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("10.0.0.1"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_from_path() {
        assert_eq!(
            RateLimitAction::from_path("/v1/auth/login"),
            RateLimitAction::Login
        );
        assert_eq!(
            RateLimitAction::from_path("/v1/auth/reset-password/"),
            RateLimitAction::PasswordReset
        );
        assert_eq!(RateLimitAction::from_path("/health"), RateLimitAction::Other);
    }
}
