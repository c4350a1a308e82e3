//! Postgres-backed repositories (schema in `sql/schema.sql`).
//!
//! Single-use tokens and refresh rotation rely on conditional `UPDATE ... RETURNING`
//! so the database arbitrates concurrent callers.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::BTreeSet;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    error::{RepoResult, RepositoryError},
    models::{AnonymousSession, OneTimeToken, Session, TokenPurpose, User},
    repo::{SessionRepository, UserRepository},
};

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn decoded<T>(value: Option<Result<T, sqlx::Error>>, what: &str) -> RepoResult<Option<T>> {
    let value = value
        .transpose()
        .with_context(|| format!("failed to decode {what}"))?;
    Ok(value)
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let roles: Vec<String> = row.try_get("roles")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        is_verified: row.try_get("is_verified")?,
        is_active: row.try_get("is_active")?,
        roles: roles.into_iter().collect::<BTreeSet<_>>(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        refresh_token_handle: row.try_get("refresh_token_handle")?,
        device_id: row.try_get("device_id")?,
        user_agent: row.try_get("user_agent")?,
        ip_address: row.try_get("ip_address")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
    })
}

fn one_time_token_from_row(
    row: &PgRow,
    purpose: TokenPurpose,
) -> Result<OneTimeToken, sqlx::Error> {
    Ok(OneTimeToken {
        user_id: row.try_get("user_id")?,
        purpose,
        token_hash: row.try_get("token_hash")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        created_at: row.try_get("created_at")?,
    })
}

fn anonymous_session_from_row(row: &PgRow) -> Result<AnonymousSession, sqlx::Error> {
    Ok(AnonymousSession {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_token(&self, token: &OneTimeToken) -> RepoResult<()> {
        let query = r"
            INSERT INTO one_time_tokens
                (token_hash, purpose, user_id, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        sqlx::query(query)
            .bind(&token.token_hash)
            .bind(token.purpose.as_str())
            .bind(token.user_id)
            .bind(token.expires_at)
            .bind(token.used)
            .bind(token.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .with_context(|| format!("failed to insert {} token", token.purpose.as_str()))?;
        Ok(())
    }

    async fn valid_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>> {
        let query = r"
            SELECT token_hash, user_id, expires_at, used, created_at
            FROM one_time_tokens
            WHERE purpose = $1
              AND token_hash = $2
              AND used = FALSE
              AND expires_at > $3
        ";
        let row = sqlx::query(query)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup one-time token")?;
        decoded(row.map(|row| one_time_token_from_row(&row, purpose)), "one-time token")
    }

    async fn mark_used(&self, purpose: TokenPurpose, token_hash: &[u8]) -> RepoResult<()> {
        let query = r"
            UPDATE one_time_tokens
            SET used = TRUE
            WHERE purpose = $1 AND token_hash = $2
        ";
        sqlx::query(query)
            .bind(purpose.as_str())
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to mark one-time token used")?;
        Ok(())
    }

    async fn consume(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        let query = r"
            UPDATE one_time_tokens
            SET used = TRUE
            WHERE purpose = $1
              AND token_hash = $2
              AND used = FALSE
              AND expires_at > $3
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to consume one-time token")?;
        decoded(row.map(|row| row.try_get("user_id")), "one-time token owner")
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: &User, password_hash: &str) -> RepoResult<()> {
        let query = r"
            INSERT INTO users
                (id, email, name, password_hash, is_verified, is_active, roles, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let roles: Vec<String> = user.roles.iter().cloned().collect();
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(password_hash)
            .bind(user.is_verified)
            .bind(user.is_active)
            .bind(roles)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert user")
                .into()),
        }
    }

    async fn get_user(&self, user_id: Uuid) -> RepoResult<Option<User>> {
        let query = r"
            SELECT id, email, name, is_verified, is_active, roles,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user")?;
        decoded(row.as_ref().map(user_from_row), "user")
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let query = r"
            SELECT id, email, name, is_verified, is_active, roles,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE email = $1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;
        decoded(row.as_ref().map(user_from_row), "user")
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> RepoResult<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("user {user_id} not found").into());
        }
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        let query = "UPDATE users SET last_login_at = $2 WHERE id = $1";
        sqlx::query(query)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update last login")?;
        Ok(())
    }

    async fn get_password_hash(&self, user_id: Uuid) -> RepoResult<Option<String>> {
        let query = "SELECT password_hash FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup password hash")?;
        decoded(row.map(|row| row.try_get("password_hash")), "password hash")
    }

    async fn mark_user_verified(&self, user_id: Uuid) -> RepoResult<()> {
        let query = r"
            UPDATE users
            SET is_verified = TRUE, updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to mark user verified")?;
        Ok(())
    }

    async fn create_email_verification_token(&self, token: &OneTimeToken) -> RepoResult<()> {
        self.insert_token(token).await
    }

    async fn verify_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>> {
        self.valid_token(TokenPurpose::EmailVerification, token_hash, now)
            .await
    }

    async fn mark_email_token_used(&self, token_hash: &[u8]) -> RepoResult<()> {
        self.mark_used(TokenPurpose::EmailVerification, token_hash)
            .await
    }

    async fn consume_email_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        self.consume(TokenPurpose::EmailVerification, token_hash, now)
            .await
    }

    async fn create_password_reset_token(&self, token: &OneTimeToken) -> RepoResult<()> {
        self.insert_token(token).await
    }

    async fn verify_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<OneTimeToken>> {
        self.valid_token(TokenPurpose::PasswordReset, token_hash, now)
            .await
    }

    async fn mark_password_reset_token_used(&self, token_hash: &[u8]) -> RepoResult<()> {
        self.mark_used(TokenPurpose::PasswordReset, token_hash)
            .await
    }

    async fn consume_password_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        self.consume(TokenPurpose::PasswordReset, token_hash, now)
            .await
    }

    async fn cleanup_spent_tokens(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let query = "DELETE FROM one_time_tokens WHERE used = TRUE OR expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to clean up one-time tokens")?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_session(&self, session: &Session) -> RepoResult<()> {
        let query = r"
            INSERT INTO sessions
                (id, user_id, refresh_token_handle, device_id, user_agent, ip_address,
                 created_at, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let result = sqlx::query(query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.refresh_token_handle)
            .bind(&session.device_id)
            .bind(&session.user_agent)
            .bind(&session.ip_address)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.is_active)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert session")
                .into()),
        }
    }

    async fn get_session(&self, session_id: Uuid) -> RepoResult<Option<Session>> {
        let query = "SELECT * FROM sessions WHERE id = $1";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        decoded(row.as_ref().map(session_from_row), "session")
    }

    async fn get_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Session>> {
        let query = r"
            SELECT *
            FROM sessions
            WHERE user_id = $1
              AND is_active = TRUE
              AND expires_at > $2
            ORDER BY created_at DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list user sessions")?;
        let sessions = rows
            .iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to decode sessions")?;
        Ok(sessions)
    }

    async fn rotate_refresh_handle(
        &self,
        session_id: Uuid,
        current: &str,
        next: &str,
    ) -> RepoResult<bool> {
        let query = r"
            UPDATE sessions
            SET refresh_token_handle = $3
            WHERE id = $1
              AND refresh_token_handle = $2
              AND is_active = TRUE
        ";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(current)
            .bind(next)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to rotate refresh handle")?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_session(&self, session_id: Uuid) -> RepoResult<bool> {
        let query = "UPDATE sessions SET is_active = FALSE WHERE id = $1 AND is_active = TRUE";
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to deactivate session")?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let query =
            "UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active = TRUE";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to deactivate user sessions")?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let query = "DELETE FROM sessions WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to clean up expired sessions")?;
        Ok(result.rows_affected())
    }

    async fn create_anonymous_session(&self, session: &AnonymousSession) -> RepoResult<()> {
        let query = r"
            INSERT INTO anonymous_sessions (id, token, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        let result = sqlx::query(query)
            .bind(session.id)
            .bind(&session.token)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert anonymous session")
                .into()),
        }
    }

    async fn get_anonymous_session(
        &self,
        session_id: Uuid,
    ) -> RepoResult<Option<AnonymousSession>> {
        let query = "SELECT id, token, created_at, expires_at FROM anonymous_sessions WHERE id = $1";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup anonymous session")?;
        decoded(row.as_ref().map(anonymous_session_from_row), "anonymous session")
    }

    async fn delete_anonymous_session(&self, session_id: Uuid) -> RepoResult<bool> {
        let query = "DELETE FROM anonymous_sessions WHERE id = $1";
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete anonymous session")?;
        Ok(result.rows_affected() == 1)
    }

    async fn cleanup_expired_anonymous_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let query = "DELETE FROM anonymous_sessions WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to clean up anonymous sessions")?;
        Ok(result.rows_affected())
    }
}
