//! `/v1/auth` endpoints.
//!
//! Handlers validate input shape, call into [`AuthService`](crate::auth::AuthService),
//! and map [`AuthError`](crate::auth::AuthError) onto HTTP statuses. Routes that need a
//! signed-in caller take [`Authenticated`](crate::api::middleware::Authenticated) as a
//! parameter, so a bad bearer token never reaches the handler body.

pub mod anonymous;
pub mod error;
pub mod me;
pub mod password;
pub mod register;
pub mod session;
pub mod sessions;
pub mod types;
pub mod verification;

use axum::{
    routing::{delete, get, post},
    Router,
};

/// Routes relative to `/v1/auth`.
pub fn routes() -> Router {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .route("/refresh", post(session::refresh))
        .route("/forgot-password", post(password::forgot_password))
        .route("/reset-password", post(password::reset_password))
        .route("/change-password", post(password::change_password))
        .route("/verify-email", post(verification::verify_email))
        .route("/resend-verification", post(verification::resend_verification))
        .route("/me", get(me::me))
        .route("/anonymous", post(anonymous::create_anonymous))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", delete(sessions::revoke_session))
}
