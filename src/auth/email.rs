//! Outbound email abstraction.
//!
//! The service hands a rendered [`EmailMessage`] to an [`EmailDispatcher`] and moves
//! on; delivery failures are logged by the caller and never change the outcome of the
//! auth operation. [`LogEmailDispatcher`] is the local/dev sender.

use anyhow::Result;
use serde_json::json;
use tracing::info;

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    #[must_use]
    pub fn verification(to_email: &str, name: &str, verify_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: TEMPLATE_VERIFY_EMAIL.to_string(),
            payload_json: json!({
                "email": to_email,
                "name": name,
                "verify_url": verify_url,
            })
            .to_string(),
        }
    }

    #[must_use]
    pub fn password_reset(to_email: &str, name: &str, reset_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: TEMPLATE_PASSWORD_RESET.to_string(),
            payload_json: json!({
                "email": to_email,
                "name": name,
                "reset_url": reset_url,
            })
            .to_string(),
        }
    }
}

pub trait EmailDispatcher: Send + Sync {
    /// Deliver a message. Errors are reported back so the caller can log them.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailDispatcher;

impl EmailDispatcher for LogEmailDispatcher {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email dispatch stub"
        );
        Ok(())
    }
}

/// Frontend link for the email verification page.
#[must_use]
pub fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Frontend link for the password reset page.
#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}
