//! Credential store: one-way password hashing and verification.

use std::sync::{Arc, LazyLock};

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use tracing::warn;

use crate::auth::hashing;
use crate::config::HashingConfig;
use crate::errors::{Error, Result};

/// Pre-computed dummy hash for timing-safe user enumeration prevention.
/// When a non-existent account is used, login still runs Argon2 verification
/// against this hash so the response time matches real verification.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    CredentialStore::new(&HashingConfig::default())
        .hash("dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$dW5rbm93bg".to_string())
});

/// Hashes and verifies account passwords. Owns no time-based state; failures
/// here are programming errors, not operational ones.
#[derive(Clone)]
pub struct CredentialStore {
    argon2: Arc<Argon2<'static>>,
}

impl CredentialStore {
    pub fn new(config: &HashingConfig) -> Self {
        Self { argon2: Arc::new(hashing::password_hasher(config)) }
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty input; hashing itself only fails
    /// on internal Argon2 errors.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(Error::validation_field("Password cannot be empty", "password"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| Error::internal(format!("Failed to hash password: {}", err)))?;
        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored hash. Malformed hashes
    /// verify as false rather than erroring.
    pub fn verify(&self, plaintext: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(err) => {
                warn!(error = %err, "stored password hash is malformed");
                false
            }
        }
    }

    /// Burn the same verification time as a real credential check. Used on
    /// the unknown-account login path so response timing does not reveal
    /// whether an account exists.
    pub fn equalize_timing(&self, plaintext: &str) {
        if self.verify(plaintext, &DUMMY_HASH) {
            warn!("dummy hash verification unexpectedly succeeded");
        }
    }
}
