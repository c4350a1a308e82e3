//! Domain and repository errors.

use thiserror::Error;

/// Errors raised by auth service operations.
///
/// Variants are deliberately coarse: callers must not be able to tell an unknown
/// account from a wrong password, or a foreign session from a missing one.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("user not found")]
    UserNotFound,

    #[error("email not verified")]
    UserNotVerified,

    #[error("account disabled")]
    UserDisabled,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("session not found")]
    SessionNotFound,

    /// Malformed caller input.
    #[error("{0}")]
    Validation(String),

    /// Unexpected storage or crypto failure; the detail is logged, never returned.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code for logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserNotVerified => "USER_NOT_VERIFIED",
            Self::UserDisabled => "USER_DISABLED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Errors surfaced by repository implementations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Wrap an unexpected repository failure into an opaque [`AuthError::Internal`].
pub(crate) fn storage(context: &'static str) -> impl FnOnce(RepositoryError) -> AuthError {
    move |err| match err {
        RepositoryError::Conflict => AuthError::Internal(anyhow::anyhow!("{context}: conflict")),
        RepositoryError::Storage(err) => AuthError::Internal(err.context(context)),
    }
}
