//! HMAC-signed access, refresh, and anonymous tokens.
//!
//! Tokens are compact JWTs (HS256) carrying a `type` discriminator. Validation checks
//! the signature, expiry, kind, and required claims, and reports every failure as the
//! same [`TokenError::Invalid`] so callers cannot learn which step rejected a token.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{config::AuthConfig, models::User};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Anonymous,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Anonymous => "anonymous",
        }
    }
}

/// Decoded payload of a token; lives only for the duration of a request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TokenClaims {
    /// User id, or the anonymous session id for anonymous tokens.
    pub sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub session_id: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token; refresh rotation keys off this value.
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl TokenClaims {
    /// Subject parsed as a user id.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    #[must_use]
    pub fn session_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.session_id).ok()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
}

/// A signed token and the instant it stops being accepted.
///
/// Issue times are truncated to whole seconds, so `expires_at` always equals the `exp` claim.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    anonymous_ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.signing_secret().expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(config.access_token_ttl_seconds()),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_seconds()),
            anonymous_ttl: Duration::seconds(config.anonymous_session_ttl_seconds()),
        }
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access_token(&self, user: &User, session_id: Uuid) -> Result<IssuedToken> {
        self.issue_access_token_at(user, session_id, Utc::now())
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access_token_at(
        &self,
        user: &User,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let now = now.trunc_subsecs(0);
        let expires_at = now + self.access_ttl;
        let claims = TokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            roles: user.roles.iter().cloned().collect(),
            session_id: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Access,
        };
        self.sign(claims, expires_at)
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_refresh_token(&self, user_id: Uuid, session_id: Uuid) -> Result<IssuedToken> {
        self.issue_refresh_token_at(user_id, session_id, Utc::now())
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_refresh_token_at(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let now = now.trunc_subsecs(0);
        let expires_at = now + self.refresh_ttl;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            email: String::new(),
            name: String::new(),
            roles: Vec::new(),
            session_id: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Refresh,
        };
        self.sign(claims, expires_at)
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_anonymous_token(&self, session_id: Uuid) -> Result<IssuedToken> {
        self.issue_anonymous_token_at(session_id, Utc::now())
    }

    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_anonymous_token_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let now = now.trunc_subsecs(0);
        let expires_at = now + self.anonymous_ttl;
        let claims = TokenClaims {
            sub: session_id.to_string(),
            email: String::new(),
            name: String::new(),
            roles: Vec::new(),
            session_id: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Anonymous,
        };
        self.sign(claims, expires_at)
    }

    fn sign(&self, claims: TokenClaims, expires_at: DateTime<Utc>) -> Result<IssuedToken> {
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .with_context(|| format!("failed to sign {} token", claims.kind.as_str()))?;
        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Parse a token and check it is a valid token of `expected` kind right now.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] for any failure.
    pub fn parse_and_validate(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<TokenClaims, TokenError> {
        self.parse_and_validate_at(token, expected, Utc::now())
    }

    /// Same as [`Self::parse_and_validate`] against an explicit instant.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] for any failure.
    pub fn parse_and_validate_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against `now` with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|err| {
                debug!("token rejected: {err}");
                TokenError::Invalid
            })?
            .claims;

        // `exp` is the first second at which the token is no longer accepted.
        if now.timestamp() >= claims.exp
            || claims.kind != expected
            || claims.sub.trim().is_empty()
            || claims.session_id.trim().is_empty()
        {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }
}
