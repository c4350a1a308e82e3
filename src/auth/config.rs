//! Auth configuration passed explicitly to the service, codec, and middleware.

use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};

pub(crate) const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
pub(crate) const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub(crate) const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
pub(crate) const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
pub(crate) const DEFAULT_ANONYMOUS_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Upper bound for every lifetime: ten years.
pub const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

fn checked_ttl(name: &str, seconds: i64) -> Result<i64> {
    if !(1..=MAX_TTL_SECONDS).contains(&seconds) {
        bail!("{name} must be between 1 and {MAX_TTL_SECONDS} seconds, got {seconds}");
    }
    Ok(seconds)
}

#[derive(Clone)]
pub struct AuthConfig {
    signing_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    anonymous_session_ttl_seconds: i64,
    frontend_base_url: String,
}

impl AuthConfig {
    /// Build a config with default lifetimes.
    ///
    /// # Errors
    /// Returns an error if the signing secret is empty.
    pub fn new(signing_secret: SecretString) -> Result<Self> {
        if signing_secret.expose_secret().trim().is_empty() {
            bail!("signing secret must not be empty");
        }

        Ok(Self {
            signing_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            anonymous_session_ttl_seconds: DEFAULT_ANONYMOUS_SESSION_TTL_SECONDS,
            frontend_base_url: "http://localhost:3000".to_string(),
        })
    }

    /// # Errors
    /// Returns an error if `seconds` is outside `1..=MAX_TTL_SECONDS`.
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Result<Self> {
        self.access_token_ttl_seconds = checked_ttl("access token TTL", seconds)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `seconds` is outside `1..=MAX_TTL_SECONDS`.
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Result<Self> {
        self.refresh_token_ttl_seconds = checked_ttl("refresh token TTL", seconds)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `seconds` is outside `1..=MAX_TTL_SECONDS`.
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Result<Self> {
        self.reset_token_ttl_seconds = checked_ttl("reset token TTL", seconds)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `seconds` is outside `1..=MAX_TTL_SECONDS`.
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Result<Self> {
        self.verification_token_ttl_seconds = checked_ttl("verification token TTL", seconds)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `seconds` is outside `1..=MAX_TTL_SECONDS`.
    pub fn with_anonymous_session_ttl_seconds(mut self, seconds: i64) -> Result<Self> {
        self.anonymous_session_ttl_seconds = checked_ttl("anonymous session TTL", seconds)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    pub(crate) fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    #[must_use]
    pub fn anonymous_session_ttl_seconds(&self) -> i64 {
        self.anonymous_session_ttl_seconds
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_secret", &"***")
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("reset_token_ttl_seconds", &self.reset_token_ttl_seconds)
            .field(
                "verification_token_ttl_seconds",
                &self.verification_token_ttl_seconds,
            )
            .field(
                "anonymous_session_ttl_seconds",
                &self.anonymous_session_ttl_seconds,
            )
            .field("frontend_base_url", &self.frontend_base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() -> Result<()> {
        let config = AuthConfig::new(SecretString::from("s3cret"))?;

        assert_eq!(config.access_token_ttl_seconds(), 900);
        assert_eq!(config.refresh_token_ttl_seconds(), 604_800);
        assert_eq!(config.reset_token_ttl_seconds(), 3600);
        assert_eq!(config.verification_token_ttl_seconds(), 86_400);
        assert_eq!(config.anonymous_session_ttl_seconds(), 86_400);

        let config = config
            .with_access_token_ttl_seconds(60)?
            .with_refresh_token_ttl_seconds(120)?
            .with_reset_token_ttl_seconds(30)?
            .with_verification_token_ttl_seconds(45)?
            .with_anonymous_session_ttl_seconds(90)?
            .with_frontend_base_url("https://app.authgate.dev".to_string());

        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 120);
        assert_eq!(config.reset_token_ttl_seconds(), 30);
        assert_eq!(config.verification_token_ttl_seconds(), 45);
        assert_eq!(config.anonymous_session_ttl_seconds(), 90);
        assert_eq!(config.frontend_base_url(), "https://app.authgate.dev");
        Ok(())
    }

    #[test]
    fn auth_config_rejects_empty_secret() {
        assert!(AuthConfig::new(SecretString::from("")).is_err());
        assert!(AuthConfig::new(SecretString::from("   ")).is_err());
    }

    #[test]
    fn auth_config_rejects_out_of_range_ttls() -> Result<()> {
        let config = AuthConfig::new(SecretString::from("s3cret"))?;

        for seconds in [0, -1, MAX_TTL_SECONDS + 1, i64::MAX, i64::MIN] {
            assert!(config
                .clone()
                .with_access_token_ttl_seconds(seconds)
                .is_err());
            assert!(config
                .clone()
                .with_anonymous_session_ttl_seconds(seconds)
                .is_err());
        }

        let config = config.with_refresh_token_ttl_seconds(MAX_TTL_SECONDS)?;
        assert_eq!(config.refresh_token_ttl_seconds(), MAX_TTL_SECONDS);
        Ok(())
    }

    #[test]
    fn auth_config_debug_masks_secret() -> Result<()> {
        let config = AuthConfig::new(SecretString::from("do-not-print"))?;
        let debug = format!("{config:?}");
        assert!(!debug.contains("do-not-print"));
        assert!(debug.contains("***"));
        Ok(())
    }
}
