//! # Authgate (token authentication and session lifecycle)
//!
//! `authgate` issues, validates, rotates, and revokes credentials for registered
//! users and short-lived anonymous visitors.
//!
//! ## Tokens
//!
//! Three HMAC-signed token kinds share one codec:
//!
//! - **access** (15 minutes): authorizes individual API calls.
//! - **refresh** (7 days): mints new access tokens; bound to a server-side session.
//! - **anonymous** (24 hours): credential-free identity with reduced capabilities.
//!
//! Any validation failure (signature, expiry, kind, missing claims) is reported as the
//! same opaque "invalid token" outcome.
//!
//! ## Sessions
//!
//! Every successful login creates a new session. Refreshing rotates both tokens but
//! keeps the session id; the previous refresh token stops working as soon as the
//! rotation lands. Logging out deactivates one session or all of them, and a password
//! reset deactivates every session of the user.
//!
//! ## Anti-enumeration
//!
//! Login failures for unknown emails and wrong passwords are indistinguishable.
//! `forgot-password` and `resend-verification` always succeed, and revoking a session
//! owned by someone else looks exactly like revoking a session that does not exist.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
