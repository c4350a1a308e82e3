//! Maps parsed CLI arguments to an action.

use anyhow::Result;

use crate::cli::{
    actions::{server::Args, Action},
    commands::{auth, ARG_DSN, ARG_PORT},
};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_secret: auth_opts.signing_secret,
        frontend_base_url: auth_opts.frontend_base_url,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        verification_token_ttl_seconds: auth_opts.verification_token_ttl_seconds,
        anonymous_session_ttl_seconds: auth_opts.anonymous_session_ttl_seconds,
        cleanup_interval_seconds: auth_opts.cleanup_interval_seconds,
    }))
}
