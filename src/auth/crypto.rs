//! Password hashing and opaque token generation.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher as _, SaltString},
    Algorithm, Argon2, Params, PasswordVerifier, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};

const SECURE_TOKEN_BYTES: usize = 32;
const DUMMY_PASSWORD: &str = "authgate-timing-equalizer";

/// Argon2id hasher with a fixed work factor.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
    // Hash used to spend the same CPU on unknown accounts as on real ones.
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Argon2id with m=19456 KiB, t=2, p=1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: Params::DEFAULT,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Custom cost parameters.
    ///
    /// # Errors
    /// Returns an error if argon2 rejects the parameters.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Self {
            params,
            dummy_hash: Arc::new(OnceLock::new()),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    /// Fails only if the entropy source or argon2 itself fails.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut SaltRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// `true` only when `password` matches `hash`. Malformed hashes are a plain mismatch.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn one verification worth of CPU for an account that does not exist.
    pub fn verify_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| self.hash(DUMMY_PASSWORD).ok());
        if let Some(hash) = dummy {
            let _ = self.verify(password, hash);
        }
    }
}

/// Random URL-safe token for password reset and email verification links.
///
/// # Errors
/// Returns an error if the OS entropy source fails.
pub fn generate_secure_token() -> Result<String> {
    let mut bytes = [0u8; SECURE_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate secure token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Digest stored in place of the raw one-time token.
#[must_use]
pub fn digest_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
