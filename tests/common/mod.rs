#![allow(dead_code)]

use anyhow::{Context, Result};
use authgate::auth::{
    crypto::PasswordHasher,
    email::{EmailDispatcher, EmailMessage},
    memory::{MemorySessionRepository, MemoryUserRepository},
    models::{DeviceInfo, User},
    AuthConfig, AuthService,
};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const FRONTEND: &str = "http://localhost:3000";

/// Keeps every message so tests can pull tokens out of the links.
#[derive(Default)]
pub struct CapturingDispatcher {
    sent: Mutex<Vec<EmailMessage>>,
}

impl CapturingDispatcher {
    pub fn last(&self, template: &str) -> Result<EmailMessage> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .iter()
            .rev()
            .find(|message| message.template == template)
            .cloned()
            .with_context(|| format!("no {template} email sent"))
    }

    pub fn count(&self, template: &str) -> usize {
        self.sent.lock().map_or(0, |sent| {
            sent.iter()
                .filter(|message| message.template == template)
                .count()
        })
    }
}

impl EmailDispatcher for CapturingDispatcher {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

pub fn config() -> Result<AuthConfig> {
    Ok(AuthConfig::new(SecretString::from(TEST_SECRET))?
        .with_frontend_base_url(FRONTEND.to_string()))
}

/// A service plus direct handles on its in-memory stores, for seeding state.
pub struct Harness {
    pub service: Arc<AuthService>,
    pub users: Arc<MemoryUserRepository>,
    pub sessions: Arc<MemorySessionRepository>,
    pub dispatcher: Arc<CapturingDispatcher>,
}

pub fn harness() -> Result<Harness> {
    let users = Arc::new(MemoryUserRepository::new());
    let sessions = Arc::new(MemorySessionRepository::new());
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = Arc::new(
        AuthService::new(
            config()?,
            users.clone(),
            sessions.clone(),
            dispatcher.clone(),
        )
        .with_password_hasher(hasher()?),
    );
    Ok(Harness {
        service,
        users,
        sessions,
        dispatcher,
    })
}

pub fn hasher() -> Result<PasswordHasher> {
    PasswordHasher::with_params(1024, 1, 1)
}

pub fn service_with(dispatcher: Arc<CapturingDispatcher>) -> Result<Arc<AuthService>> {
    Ok(Arc::new(
        AuthService::new(
            config()?,
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemorySessionRepository::new()),
            dispatcher,
        )
        .with_password_hasher(hasher()?),
    ))
}

/// Token from the `#token=` fragment of a link in the message payload.
pub fn token_from(message: &EmailMessage, field: &str) -> Result<String> {
    let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
    let url = payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .context("missing link")?;
    let (_, token) = url.split_once("#token=").context("missing token fragment")?;
    Ok(token.to_string())
}

/// Register and verify through the emailed link.
pub async fn verified_user(
    service: &AuthService,
    dispatcher: &CapturingDispatcher,
    email: &str,
    password: &str,
) -> Result<User> {
    let user = service.register(email, password, "Alice").await?;
    let message = dispatcher.last(authgate::auth::email::TEMPLATE_VERIFY_EMAIL)?;
    service
        .verify_email(&token_from(&message, "verify_url")?)
        .await?;
    Ok(user)
}

pub fn device(id: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: id.to_string(),
        user_agent: "integration-tests".to_string(),
        ip_address: "127.0.0.1".to_string(),
    }
}
