//! Request/response types for auth endpoints.

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{models::Session, AuthError};

const MIN_PASSWORD_LEN: usize = 8;
const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 100;

/// Basic email format check.
pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email.trim()))
}

fn require_email(email: &str) -> Result<(), AuthError> {
    if valid_email(email) {
        Ok(())
    } else {
        Err(AuthError::Validation("invalid email".to_string()))
    }
}

fn require_password(field: &str, password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "{field} must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn require_present(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl RegisterRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_email(&self.email)?;
        require_password("password", &self.password)?;
        let name_len = self.name.trim().chars().count();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name_len) {
            return Err(AuthError::Validation(format!(
                "name must be between {MIN_NAME_LEN} and {MAX_NAME_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl LoginRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_email(&self.email)?;
        require_present("password", &self.password)
    }
}

/// Omit `session_id` to log out every session of the caller.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

impl LogoutRequest {
    /// An empty body means "every session"; anything else must be a valid request.
    pub(crate) fn from_body(body: &[u8]) -> Result<Self, AuthError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|_| AuthError::Validation("invalid logout request".to_string()))
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl RefreshTokenRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_present("refresh_token", &self.refresh_token)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl ForgotPasswordRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_email(&self.email)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

impl ResetPasswordRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_present("token", &self.token)?;
        require_password("new_password", &self.new_password)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_present("current_password", &self.current_password)?;
        require_password("new_password", &self.new_password)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

impl VerifyEmailRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_present("token", &self.token)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

impl ResendVerificationRequest {
    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        require_email(&self.email)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionsResponse {
    pub sessions: Vec<Session>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
