//! Authentication state machine.
//!
//! Each operation is a single transition applied to persisted users, sessions, and
//! one-time tokens. Sessions move `active -> expired` by time or `active -> revoked` by
//! logout/reset and never come back; every login creates a new session id.

use anyhow::Context;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    config::AuthConfig,
    crypto::{digest_token, generate_secure_token, PasswordHasher},
    email::{build_reset_url, build_verify_url, EmailDispatcher, EmailMessage},
    error::{storage, AuthError, RepositoryError},
    models::{AnonymousSession, DeviceInfo, OneTimeToken, Session, TokenPurpose, User},
    repo::{SessionRepository, UserRepository},
    token::{TokenCodec, TokenKind},
};

/// Tokens handed out by login and refresh.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: User,
}

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions: u64,
    pub anonymous_sessions: u64,
    pub one_time_tokens: u64,
}

impl CleanupReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions == 0 && self.anonymous_sessions == 0 && self.one_time_tokens == 0
    }
}

/// Trim and lowercase an email for lookups and uniqueness.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    email: Arc<dyn EmailDispatcher>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        email: Arc<dyn EmailDispatcher>,
    ) -> Self {
        Self {
            users,
            sessions,
            email,
            codec: TokenCodec::new(&config),
            hasher: PasswordHasher::new(),
            config,
        }
    }

    /// Replace the default argon2 cost, mostly for tests.
    #[must_use]
    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an unverified account and send the verification email.
    ///
    /// # Errors
    /// [`AuthError::UserAlreadyExists`] when the email is taken.
    #[instrument(skip(self, password, name))]
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);

        if self
            .users
            .get_user_by_email(&email)
            .await
            .map_err(storage("failed to check existing user"))?
            .is_some()
        {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = self.hash_password(password).await?;
        let user = User::new(email, name.trim().to_string(), Utc::now());

        match self.users.create_user(&user, &password_hash).await {
            Ok(()) => {}
            // Lost a race against a concurrent registration of the same email.
            Err(RepositoryError::Conflict) => return Err(AuthError::UserAlreadyExists),
            Err(err) => return Err(storage("failed to create user")(err)),
        }

        if let Err(err) = self.send_verification(&user).await {
            warn!(user_id = %user.id, "failed to send verification email: {err:#}");
        }

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Authenticate and open a new session.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] for an unknown email or wrong password,
    /// then [`AuthError::UserDisabled`] / [`AuthError::UserNotVerified`].
    #[instrument(skip(self, password, device))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);

        let user = self
            .users
            .get_user_by_email(&email)
            .await
            .map_err(storage("failed to load user"))?;

        let Some(user) = user else {
            self.burn_password_check(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        let stored_hash = self
            .users
            .get_password_hash(user.id)
            .await
            .map_err(storage("failed to load password hash"))?;

        if !self.verify_password(password, stored_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        if !user.is_verified {
            return Err(AuthError::UserNotVerified);
        }

        let now = Utc::now();
        let session_id = Uuid::new_v4();
        let refresh = self
            .codec
            .issue_refresh_token_at(user.id, session_id, now)
            .map_err(AuthError::Internal)?;
        let access = self
            .codec
            .issue_access_token_at(&user, session_id, now)
            .map_err(AuthError::Internal)?;

        let session = Session {
            id: session_id,
            user_id: user.id,
            refresh_token_handle: refresh.jti.clone(),
            device_id: device.device_id,
            user_agent: device.user_agent,
            ip_address: device.ip_address,
            created_at: now,
            expires_at: refresh.expires_at,
            is_active: true,
        };
        self.sessions
            .create_session(&session)
            .await
            .map_err(storage("failed to create session"))?;

        if let Err(err) = self.users.update_last_login(user.id, now).await {
            warn!(user_id = %user.id, "failed to update last login: {err:#}");
        }

        info!(user_id = %user.id, session_id = %session_id, "login successful");

        let mut user = user;
        user.last_login_at = Some(now);

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.config.access_token_ttl_seconds(),
            user,
        })
    }

    /// Rotate the token pair of an existing session.
    ///
    /// # Errors
    /// [`AuthError::InvalidToken`] for a bad token, unknown session, missing or
    /// disabled user, or a refresh token that was already rotated.
    /// [`AuthError::TokenExpired`] when the session is revoked or past its expiry.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self
            .codec
            .parse_and_validate(refresh_token, TokenKind::Refresh)
            .map_err(|_| AuthError::InvalidToken)?;

        let (Some(user_id), Some(session_id)) = (claims.user_id(), claims.session_uuid()) else {
            return Err(AuthError::InvalidToken);
        };

        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(storage("failed to load session"))?
            .ok_or(AuthError::InvalidToken)?;

        if session.user_id != user_id {
            return Err(AuthError::InvalidToken);
        }

        let now = Utc::now();
        if !session.is_usable_at(now) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .users
            .get_user(user_id)
            .await
            .map_err(storage("failed to load user"))?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidToken)?;

        if session.refresh_token_handle != claims.jti {
            debug!(session_id = %session_id, "stale refresh token presented");
            return Err(AuthError::InvalidToken);
        }

        let refresh = self
            .codec
            .issue_refresh_token_at(user.id, session_id, now)
            .map_err(AuthError::Internal)?;
        let access = self
            .codec
            .issue_access_token_at(&user, session_id, now)
            .map_err(AuthError::Internal)?;

        let rotated = self
            .sessions
            .rotate_refresh_handle(session_id, &claims.jti, &refresh.jti)
            .await
            .map_err(storage("failed to rotate refresh token"))?;
        if !rotated {
            return Err(AuthError::InvalidToken);
        }

        info!(user_id = %user.id, session_id = %session_id, "token refreshed");

        Ok(AuthResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.config.access_token_ttl_seconds(),
            user,
        })
    }

    /// Deactivate one session owned by `user_id`, or all of them when `session_id` is `None`.
    ///
    /// # Errors
    /// Only on storage failure.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid, session_id: Option<Uuid>) -> Result<(), AuthError> {
        match session_id {
            Some(session_id) => {
                let session = self
                    .sessions
                    .get_session(session_id)
                    .await
                    .map_err(storage("failed to load session"))?;
                if session.is_some_and(|session| session.user_id == user_id) {
                    self.sessions
                        .deactivate_session(session_id)
                        .await
                        .map_err(storage("failed to deactivate session"))?;
                }
            }
            None => {
                let count = self
                    .sessions
                    .deactivate_user_sessions(user_id)
                    .await
                    .map_err(storage("failed to deactivate user sessions"))?;
                debug!(count, "sessions deactivated");
            }
        }

        info!(user_id = %user_id, "logout successful");
        Ok(())
    }

    /// Send a reset link if the account exists. Always succeeds for unknown emails.
    ///
    /// # Errors
    /// Only on storage or entropy failure.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self
            .users
            .get_user_by_email(&email)
            .await
            .map_err(storage("failed to load user"))?
        else {
            debug!("forgot password for unknown email");
            return Ok(());
        };

        let token = generate_secure_token().map_err(AuthError::Internal)?;
        let now = Utc::now();
        let record = OneTimeToken {
            user_id: user.id,
            purpose: TokenPurpose::PasswordReset,
            token_hash: digest_token(&token),
            expires_at: now + Duration::seconds(self.config.reset_token_ttl_seconds()),
            used: false,
            created_at: now,
        };
        self.users
            .create_password_reset_token(&record)
            .await
            .map_err(storage("failed to store reset token"))?;

        let reset_url = build_reset_url(self.config.frontend_base_url(), &token);
        self.dispatch(&EmailMessage::password_reset(
            &user.email,
            &user.name,
            &reset_url,
        ));

        info!(user_id = %user.id, "password reset initiated");
        Ok(())
    }

    /// Consume a reset token, store the new password, and revoke every session.
    ///
    /// # Errors
    /// [`AuthError::InvalidToken`] for an unknown, used, or expired token.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        // The token is only burned once the new hash is ready.
        let password_hash = self.hash_password(new_password).await?;

        let token_hash = digest_token(token.trim());
        let user_id = self
            .users
            .consume_password_reset_token(&token_hash, Utc::now())
            .await
            .map_err(storage("failed to consume reset token"))?
            .ok_or(AuthError::InvalidToken)?;

        self.users
            .update_password(user_id, &password_hash)
            .await
            .map_err(storage("failed to update password"))?;

        let count = self
            .sessions
            .deactivate_user_sessions(user_id)
            .await
            .map_err(storage("failed to deactivate user sessions"))?;

        info!(user_id = %user_id, revoked = count, "password reset");
        Ok(())
    }

    /// Change the password after proving the current one. Other sessions stay active.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] when `current_password` does not verify.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let stored_hash = self
            .users
            .get_password_hash(user_id)
            .await
            .map_err(storage("failed to load password hash"))?;

        if !self.verify_password(current_password, stored_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hash_password(new_password).await?;
        self.users
            .update_password(user_id, &password_hash)
            .await
            .map_err(storage("failed to update password"))?;

        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// # Errors
    /// [`AuthError::InvalidToken`] for an unknown, used, or expired token.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let token_hash = digest_token(token.trim());
        let user_id = self
            .users
            .consume_email_token(&token_hash, Utc::now())
            .await
            .map_err(storage("failed to consume verification token"))?
            .ok_or(AuthError::InvalidToken)?;

        self.users
            .mark_user_verified(user_id)
            .await
            .map_err(storage("failed to mark user verified"))?;

        info!(user_id = %user_id, "email verified");
        Ok(())
    }

    /// Mint and send a fresh verification link. No-op for unknown or verified users.
    ///
    /// # Errors
    /// Only on storage failure while looking up the user.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_user_by_email(&email)
            .await
            .map_err(storage("failed to load user"))?;

        match user {
            Some(user) if !user.is_verified => {
                if let Err(err) = self.send_verification(&user).await {
                    warn!(user_id = %user.id, "failed to resend verification email: {err:#}");
                }
                info!(user_id = %user.id, "verification email resent");
            }
            _ => debug!("resend verification skipped"),
        }
        Ok(())
    }

    /// # Errors
    /// [`AuthError::UserNotFound`] when no such user exists.
    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .get_user(user_id)
            .await
            .map_err(storage("failed to load user"))?
            .ok_or(AuthError::UserNotFound)
    }

    /// Issue an anonymous identity. Needs no credentials.
    ///
    /// # Errors
    /// Only on signing or storage failure.
    #[instrument(skip(self))]
    pub async fn create_anonymous_session(&self) -> Result<AnonymousSession, AuthError> {
        // Whole seconds, matching the token's `iat`/`exp` claims.
        let now = Utc::now().trunc_subsecs(0);
        let session_id = Uuid::new_v4();
        let issued = self
            .codec
            .issue_anonymous_token_at(session_id, now)
            .map_err(AuthError::Internal)?;

        let session = AnonymousSession {
            id: session_id,
            token: issued.token,
            created_at: now,
            expires_at: issued.expires_at,
        };
        self.sessions
            .create_anonymous_session(&session)
            .await
            .map_err(storage("failed to create anonymous session"))?;

        info!(session_id = %session_id, "anonymous session created");
        Ok(session)
    }

    /// Active, unexpired sessions of the user.
    ///
    /// # Errors
    /// Only on storage failure.
    pub async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        self.sessions
            .get_user_sessions(user_id, Utc::now())
            .await
            .map_err(storage("failed to list sessions"))
    }

    /// # Errors
    /// [`AuthError::SessionNotFound`] when the session is missing or belongs to someone else.
    #[instrument(skip(self))]
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AuthError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(storage("failed to load session"))?
            .filter(|session| session.user_id == user_id)
            .ok_or(AuthError::SessionNotFound)?;

        self.sessions
            .deactivate_session(session.id)
            .await
            .map_err(storage("failed to deactivate session"))?;

        info!(user_id = %user_id, session_id = %session_id, "session revoked");
        Ok(())
    }

    /// Reap expired sessions, expired anonymous sessions, and spent one-time tokens.
    ///
    /// # Errors
    /// Only on storage failure.
    pub async fn cleanup_expired(&self) -> Result<CleanupReport, AuthError> {
        self.cleanup_expired_at(Utc::now()).await
    }

    /// Same as [`Self::cleanup_expired`] against an explicit instant.
    ///
    /// # Errors
    /// Only on storage failure.
    pub async fn cleanup_expired_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, AuthError> {
        let sessions = self
            .sessions
            .cleanup_expired_sessions(now)
            .await
            .map_err(storage("failed to clean up sessions"))?;
        let anonymous_sessions = self
            .sessions
            .cleanup_expired_anonymous_sessions(now)
            .await
            .map_err(storage("failed to clean up anonymous sessions"))?;
        let one_time_tokens = self
            .users
            .cleanup_spent_tokens(now)
            .await
            .map_err(storage("failed to clean up one-time tokens"))?;
        Ok(CleanupReport {
            sessions,
            anonymous_sessions,
            one_time_tokens,
        })
    }

    async fn send_verification(&self, user: &User) -> anyhow::Result<()> {
        let token = generate_secure_token()?;
        let now = Utc::now();
        let record = OneTimeToken {
            user_id: user.id,
            purpose: TokenPurpose::EmailVerification,
            token_hash: digest_token(&token),
            expires_at: now + Duration::seconds(self.config.verification_token_ttl_seconds()),
            used: false,
            created_at: now,
        };
        self.users
            .create_email_verification_token(&record)
            .await
            .context("failed to store verification token")?;

        let verify_url = build_verify_url(self.config.frontend_base_url(), &token);
        self.dispatch(&EmailMessage::verification(
            &user.email,
            &user.name,
            &verify_url,
        ));
        Ok(())
    }

    fn dispatch(&self, message: &EmailMessage) {
        if let Err(err) = self.email.send(message) {
            warn!(template = %message.template, "email dispatch failed: {err:#}");
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")
            .and_then(|result| result)
            .map_err(AuthError::Internal)
    }

    async fn verify_password(
        &self,
        password: &str,
        stored_hash: Option<String>,
    ) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                hasher.verify_dummy(&password);
                false
            }
        })
        .await
        .context("password verification task failed")
        .map_err(AuthError::Internal)
    }

    async fn burn_password_check(&self, password: &str) {
        // Result is irrelevant; only the elapsed time matters.
        let _ = self.verify_password(password, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::{MemorySessionRepository, MemoryUserRepository};
    use anyhow::Result;
    use secrecy::SecretString;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingDispatcher {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl EmailDispatcher for CapturingDispatcher {
        fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(message.clone());
            Ok(())
        }
    }

    struct FailingDispatcher;

    impl EmailDispatcher for FailingDispatcher {
        fn send(&self, _message: &EmailMessage) -> anyhow::Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    fn service(email: Arc<dyn EmailDispatcher>) -> Result<AuthService> {
        let config = AuthConfig::new(SecretString::from("unit-test-secret"))?;
        Ok(AuthService::new(
            config,
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemorySessionRepository::new()),
            email,
        )
        .with_password_hasher(PasswordHasher::with_params(1024, 1, 1)?))
    }

    fn token_from_link(message: &EmailMessage, field: &str) -> Result<String> {
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        let url = payload
            .get(field)
            .and_then(serde_json::Value::as_str)
            .context("missing link")?;
        let (_, token) = url.split_once("#token=").context("missing token")?;
        Ok(token.to_string())
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn register_normalizes_email_and_sends_link() -> Result<()> {
        let dispatcher = Arc::new(CapturingDispatcher::default());
        let service = service(dispatcher.clone())?;

        let user = service
            .register(" Alice@Example.com ", "Secret123!", "Alice")
            .await?;
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_verified);

        let sent = dispatcher
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "alice@example.com");
        assert!(!token_from_link(&sent[0], "verify_url")?.is_empty());

        let duplicate = service
            .register("ALICE@example.com", "Secret123!", "Alice")
            .await;
        assert!(matches!(duplicate, Err(AuthError::UserAlreadyExists)));
        Ok(())
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_fail_registration() -> Result<()> {
        let service = service(Arc::new(FailingDispatcher))?;
        let user = service
            .register("bob@example.com", "Secret123!", "Bob")
            .await?;
        assert_eq!(user.email, "bob@example.com");

        service.forgot_password("bob@example.com").await?;
        service.resend_verification("bob@example.com").await?;
        Ok(())
    }

    #[tokio::test]
    async fn unverified_user_cannot_login() -> Result<()> {
        let service = service(Arc::new(CapturingDispatcher::default()))?;
        service
            .register("carol@example.com", "Secret123!", "Carol")
            .await?;

        let result = service
            .login("carol@example.com", "Secret123!", DeviceInfo::default())
            .await;
        assert!(matches!(result, Err(AuthError::UserNotVerified)));

        let result = service
            .login("carol@example.com", "wrong-password", DeviceInfo::default())
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn get_user_reports_missing() -> Result<()> {
        let service = service(Arc::new(CapturingDispatcher::default()))?;
        assert!(matches!(
            service.get_user(Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
        Ok(())
    }
}
