//! Storage contracts for users, sessions, and one-time tokens.
//!
//! The service only talks to these traits; [`super::memory`] and [`super::postgres`]
//! provide the implementations. One-time tokens are addressed by the SHA-256 digest of
//! the raw value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    error::RepoResult,
    models::{AnonymousSession, OneTimeToken, Session, User},
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Returns [`super::error::RepositoryError::Conflict`] when the
    /// email is already taken.
    async fn create_user(&self, user: &User, password_hash: &str) -> RepoResult<()>;

    async fn get_user(&self, user_id: Uuid) -> RepoResult<Option<User>>;

    /// Lookup by normalized email.
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()>;

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    async fn get_password_hash(&self, user_id: Uuid) -> RepoResult<Option<String>>;

    async fn mark_user_verified(&self, user_id: Uuid) -> RepoResult<()>;

    async fn create_email_verification_token(&self, token: &OneTimeToken) -> RepoResult<()>;

    /// Return the token only while it is unused and unexpired at `now`.
    async fn verify_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>>;

    async fn mark_email_token_used(&self, token_hash: &[u8]) -> RepoResult<()>;

    /// Check and mark used in one step. Exactly one concurrent caller gets the user id.
    async fn consume_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>>;

    async fn create_password_reset_token(&self, token: &OneTimeToken) -> RepoResult<()>;

    /// Return the token only while it is unused and unexpired at `now`.
    async fn verify_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>>;

    async fn mark_password_reset_token_used(&self, token_hash: &[u8]) -> RepoResult<()>;

    /// Check and mark used in one step. Exactly one concurrent caller gets the user id.
    async fn consume_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>>;

    /// Delete one-time tokens of either purpose that are used or expired at `now`.
    async fn cleanup_spent_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &Session) -> RepoResult<()>;

    async fn get_session(&self, session_id: Uuid) -> RepoResult<Option<Session>>;

    /// Active sessions of `user_id` that have not expired at `now`.
    async fn get_user_sessions(&self, user_id: Uuid, now: DateTime<Utc>)
        -> RepoResult<Vec<Session>>;

    /// Swap the refresh handle only if it still equals `current`.
    ///
    /// Returns `false` when another rotation won or the session is no longer active.
    async fn rotate_refresh_handle(
        &self,
        session_id: Uuid,
        current: &str,
        next: &str,
    ) -> RepoResult<bool>;

    /// Returns `true` if the session existed and was active.
    async fn deactivate_session(&self, session_id: Uuid) -> RepoResult<bool>;

    /// Returns the number of sessions that were deactivated.
    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64>;

    /// Delete sessions whose `expires_at` is not after `now`.
    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64>;

    async fn create_anonymous_session(&self, session: &AnonymousSession) -> RepoResult<()>;

    async fn get_anonymous_session(&self, session_id: Uuid)
        -> RepoResult<Option<AnonymousSession>>;

    async fn delete_anonymous_session(&self, session_id: Uuid) -> RepoResult<bool>;

    async fn cleanup_expired_anonymous_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}
