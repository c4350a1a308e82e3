//! In-process repositories for local development and tests.
//!
//! State lives behind a single `tokio::sync::Mutex` per repository, so every
//! check-and-set below is atomic with respect to other callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    error::{RepoResult, RepositoryError},
    models::{AnonymousSession, OneTimeToken, Session, TokenPurpose, User},
    repo::{SessionRepository, UserRepository},
};

#[derive(Debug, Default)]
struct UserState {
    users: HashMap<Uuid, User>,
    password_hashes: HashMap<Uuid, String>,
    // Keyed by (purpose, digest).
    tokens: HashMap<(&'static str, Vec<u8>), OneTimeToken>,
}

impl UserState {
    fn token_key(purpose: TokenPurpose, token_hash: &[u8]) -> (&'static str, Vec<u8>) {
        (purpose.as_str(), token_hash.to_vec())
    }

    fn insert_token(&mut self, token: &OneTimeToken) {
        self.tokens.insert(
            Self::token_key(token.purpose, &token.token_hash),
            token.clone(),
        );
    }

    fn valid_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Option<OneTimeToken> {
        self.tokens
            .get(&Self::token_key(purpose, token_hash))
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    fn mark_used(&mut self, purpose: TokenPurpose, token_hash: &[u8]) {
        if let Some(token) = self.tokens.get_mut(&Self::token_key(purpose, token_hash)) {
            token.used = true;
        }
    }

    fn consume(
        &mut self,
        purpose: TokenPurpose,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        let token = self
            .tokens
            .get_mut(&Self::token_key(purpose, token_hash))?;
        if !token.is_valid_at(now) {
            return None;
        }
        token.used = true;
        Some(token.user_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    state: Mutex<UserState>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create_user(&self, user: &User, password_hash: &str) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|existing| existing.email == user.email)
        {
            return Err(RepositoryError::Conflict);
        }
        state.users.insert(user.id, user.clone());
        state
            .password_hashes
            .insert(user.id, password_hash.to_string());
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Err(anyhow::anyhow!("user {user_id} not found").into());
        };
        user.updated_at = Utc::now();
        state
            .password_hashes
            .insert(user_id, password_hash.to_string());
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn get_password_hash(&self, user_id: Uuid) -> RepoResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .password_hashes
            .get(&user_id)
            .cloned())
    }

    async fn mark_user_verified(&self, user_id: Uuid) -> RepoResult<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.is_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_email_verification_token(&self, token: &OneTimeToken) -> RepoResult<()> {
        self.state.lock().await.insert_token(token);
        Ok(())
    }

    async fn verify_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>> {
        Ok(self
            .state
            .lock()
            .await
            .valid_token(TokenPurpose::EmailVerification, token_hash, now))
    }

    async fn mark_email_token_used(&self, token_hash: &[u8]) -> RepoResult<()> {
        self.state
            .lock()
            .await
            .mark_used(TokenPurpose::EmailVerification, token_hash);
        Ok(())
    }

    async fn consume_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        Ok(self
            .state
            .lock()
            .await
            .consume(TokenPurpose::EmailVerification, token_hash, now))
    }

    async fn create_password_reset_token(&self, token: &OneTimeToken) -> RepoResult<()> {
        self.state.lock().await.insert_token(token);
        Ok(())
    }

    async fn verify_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>> {
        Ok(self
            .state
            .lock()
            .await
            .valid_token(TokenPurpose::PasswordReset, token_hash, now))
    }

    async fn mark_password_reset_token_used(&self, token_hash: &[u8]) -> RepoResult<()> {
        self.state
            .lock()
            .await
            .mark_used(TokenPurpose::PasswordReset, token_hash);
        Ok(())
    }

    async fn consume_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        Ok(self
            .state
            .lock()
            .await
            .consume(TokenPurpose::PasswordReset, token_hash, now))
    }

    async fn cleanup_spent_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, token| token.is_valid_at(now));
        Ok((before - state.tokens.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<Uuid, Session>,
    anonymous: HashMap<Uuid, AnonymousSession>,
}

#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    state: Mutex<SessionState>,
}

impl MemorySessionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create_session(&self, session: &Session) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> RepoResult<Option<Session>> {
        Ok(self.state.lock().await.sessions.get(&session_id).cloned())
    }

    async fn get_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .state
            .lock()
            .await
            .sessions
            .values()
            .filter(|session| session.user_id == user_id && session.is_usable_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn rotate_refresh_handle(
        &self,
        session_id: Uuid,
        current: &str,
        next: &str,
    ) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.is_active && session.refresh_token_handle == current => {
                session.refresh_token_handle = next.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_session(&self, session_id: Uuid) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|session| session.user_id == user_id && session.is_active)
        {
            session.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn create_anonymous_session(&self, session: &AnonymousSession) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if state.anonymous.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        state.anonymous.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_anonymous_session(
        &self,
        session_id: Uuid,
    ) -> RepoResult<Option<AnonymousSession>> {
        Ok(self.state.lock().await.anonymous.get(&session_id).cloned())
    }

    async fn delete_anonymous_session(&self, session_id: Uuid) -> RepoResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .anonymous
            .remove(&session_id)
            .is_some())
    }

    async fn cleanup_expired_anonymous_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.anonymous.len();
        state.anonymous.retain(|_, session| !session.is_expired_at(now));
        Ok((before - state.anonymous.len()) as u64)
    }
}
