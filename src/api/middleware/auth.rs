//! Bearer token extractors.
//!
//! Claims reach handlers as typed extractor parameters. A rejected token
//! short-circuits with a uniform 401 before the handler body runs.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::{AuthService, TokenClaims, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Missing, malformed, or invalid bearer token.
    Unauthorized,
    /// The auth service was not registered on the router.
    Misconfigured,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid or missing token" })),
            )
                .into_response(),
            Self::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response(),
        }
    }
}

/// A caller holding a valid access token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub claims: TokenClaims,
}

/// Claims when a bearer header is present and valid (access or anonymous), `None` when absent.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<TokenClaims>);

/// Token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn auth_service(parts: &Parts) -> Result<Arc<AuthService>, AuthRejection> {
    parts
        .extensions
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| {
            error!("auth service extension missing");
            AuthRejection::Misconfigured
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let service = auth_service(parts)?;
        let token = bearer_token(&parts.headers).ok_or(AuthRejection::Unauthorized)?;

        let claims = service
            .codec()
            .parse_and_validate(token, TokenKind::Access)
            .map_err(|_| {
                debug!("access token rejected");
                AuthRejection::Unauthorized
            })?;

        let (Some(user_id), Some(session_id)) = (claims.user_id(), claims.session_uuid()) else {
            return Err(AuthRejection::Unauthorized);
        };

        Ok(Self {
            user_id,
            session_id,
            claims,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Self(None));
        }

        let service = auth_service(parts)?;
        let token = bearer_token(&parts.headers).ok_or(AuthRejection::Unauthorized)?;

        service
            .codec()
            .parse_and_validate(token, TokenKind::Access)
            .or_else(|_| service.codec().parse_and_validate(token, TokenKind::Anonymous))
            .map(|claims| Self(Some(claims)))
            .map_err(|_| AuthRejection::Unauthorized)
    }
}
