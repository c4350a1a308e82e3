use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    api::{self, middleware::NoopRateLimiter},
    auth::{
        email::LogEmailDispatcher,
        memory::{MemorySessionRepository, MemoryUserRepository},
        postgres::{PgSessionRepository, PgUserRepository},
        repo::{SessionRepository, UserRepository},
        AuthConfig, AuthService,
    },
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub signing_secret: SecretString,
    pub frontend_base_url: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub verification_token_ttl_seconds: i64,
    pub anonymous_session_ttl_seconds: i64,
    pub cleanup_interval_seconds: u64,
}

impl Args {
    fn auth_config(&self) -> Result<AuthConfig> {
        Ok(AuthConfig::new(self.signing_secret.clone())?
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)?
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)?
            .with_reset_token_ttl_seconds(self.reset_token_ttl_seconds)?
            .with_verification_token_ttl_seconds(self.verification_token_ttl_seconds)?
            .with_anonymous_session_ttl_seconds(self.anonymous_session_ttl_seconds)?
            .with_frontend_base_url(self.frontend_base_url.clone()))
    }
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is invalid, the database is unreachable,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.auth_config()?;

    let (users, sessions): (Arc<dyn UserRepository>, Arc<dyn SessionRepository>) =
        match &args.dsn {
            Some(dsn) => {
                let pool = PgPoolOptions::new()
                    .min_connections(1)
                    .max_connections(5)
                    .max_lifetime(Duration::from_secs(60 * 2))
                    .test_before_acquire(true)
                    .connect(dsn)
                    .await
                    .context("Failed to connect to database")?;

                info!("Using postgres storage");
                (
                    Arc::new(PgUserRepository::new(pool.clone())),
                    Arc::new(PgSessionRepository::new(pool)),
                )
            }
            None => {
                warn!("No DSN configured, users and sessions are kept in memory");
                (
                    Arc::new(MemoryUserRepository::new()),
                    Arc::new(MemorySessionRepository::new()),
                )
            }
        };

    let service = Arc::new(AuthService::new(
        config,
        users,
        sessions,
        Arc::new(LogEmailDispatcher),
    ));

    api::new(
        args.port,
        service,
        Arc::new(NoopRateLimiter),
        Duration::from_secs(args.cleanup_interval_seconds),
    )
    .await
}
