use anyhow::{bail, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::MAX_TTL_SECONDS;

pub const ARG_SIGNING_SECRET: &str = "signing-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL: &str = "reset-token-ttl-seconds";
pub const ARG_VERIFICATION_TOKEN_TTL: &str = "verification-token-ttl-seconds";
pub const ARG_ANONYMOUS_SESSION_TTL: &str = "anonymous-session-ttl-seconds";
pub const ARG_CLEANUP_INTERVAL: &str = "cleanup-interval-seconds";

#[derive(Debug)]
pub struct Options {
    pub signing_secret: SecretString,
    pub frontend_base_url: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub verification_token_ttl_seconds: i64,
    pub anonymous_session_ttl_seconds: i64,
    pub cleanup_interval_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or a lifetime is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let signing_secret = match matches.get_one::<String>(ARG_SIGNING_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => bail!("missing required argument: --{ARG_SIGNING_SECRET}"),
        };

        let ttl = |id: &str| -> Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or_default();
            if !(1..=MAX_TTL_SECONDS).contains(&value) {
                bail!("--{id} must be between 1 and {MAX_TTL_SECONDS}");
            }
            Ok(value)
        };

        Ok(Self {
            signing_secret,
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            access_token_ttl_seconds: ttl(ARG_ACCESS_TOKEN_TTL)?,
            refresh_token_ttl_seconds: ttl(ARG_REFRESH_TOKEN_TTL)?,
            reset_token_ttl_seconds: ttl(ARG_RESET_TOKEN_TTL)?,
            verification_token_ttl_seconds: ttl(ARG_VERIFICATION_TOKEN_TTL)?,
            anonymous_session_ttl_seconds: ttl(ARG_ANONYMOUS_SESSION_TTL)?,
            cleanup_interval_seconds: matches
                .get_one::<u64>(ARG_CLEANUP_INTERVAL)
                .copied()
                .unwrap_or(3600)
                .max(1),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new(ARG_SIGNING_SECRET)
                .long(ARG_SIGNING_SECRET)
                .help("HMAC secret used to sign access, refresh, and anonymous tokens")
                .env("AUTHGATE_SIGNING_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for email links and the CORS origin")
                .env("AUTHGATE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        );

    with_ttl_args(command).arg(
        Arg::new(ARG_CLEANUP_INTERVAL)
            .long(ARG_CLEANUP_INTERVAL)
            .help("How often expired sessions are removed")
            .env("AUTHGATE_CLEANUP_INTERVAL_SECONDS")
            .default_value("3600")
            .value_parser(clap::value_parser!(u64)),
    )
}

fn with_ttl_args(command: Command) -> Command {
    [
        (ARG_ACCESS_TOKEN_TTL, "AUTHGATE_ACCESS_TOKEN_TTL_SECONDS", "900", "Access token TTL in seconds"),
        (ARG_REFRESH_TOKEN_TTL, "AUTHGATE_REFRESH_TOKEN_TTL_SECONDS", "604800", "Refresh token and session TTL in seconds"),
        (ARG_RESET_TOKEN_TTL, "AUTHGATE_RESET_TOKEN_TTL_SECONDS", "3600", "Password reset token TTL in seconds"),
        (ARG_VERIFICATION_TOKEN_TTL, "AUTHGATE_VERIFICATION_TOKEN_TTL_SECONDS", "86400", "Email verification token TTL in seconds"),
        (ARG_ANONYMOUS_SESSION_TTL, "AUTHGATE_ANONYMOUS_SESSION_TTL_SECONDS", "86400", "Anonymous session TTL in seconds"),
    ]
    .into_iter()
    .fold(command, |command, (id, env, default, help)| {
        command.arg(
            Arg::new(id)
                .long(id)
                .help(help)
                .env(env)
                .default_value(default)
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TTL_SECONDS)),
        )
    })
}
