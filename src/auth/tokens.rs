//! Signed bearer token issuing and verification.
//!
//! Purely a cryptographic transform: no storage side effects, reusable by
//! the session registry. Issuer and audience are embedded constants so
//! tokens minted by other deployments never verify here.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::domain::{AccountId, Role};
use crate::errors::{AuthErrorType, Error, Result};

/// Fixed issuer claim for all RideGate tokens
pub const ISSUER: &str = "ridegate";

/// Fixed audience claim for all RideGate tokens
pub const AUDIENCE: &str = "ridegate-platform";

/// Token-class tag carried by access tokens
pub const ACCESS_TOKEN_CLASS: &str = "access";

/// Token-class tag carried by refresh tokens
pub const REFRESH_TOKEN_CLASS: &str = "refresh";

/// Claims carried by both token classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account identifier
    pub sub: String,
    /// Platform role, propagated into authorization decisions
    pub role: Role,
    /// Whether the account's contact channel is verified
    pub verified: bool,
    /// Token class tag ("access" or "refresh")
    pub token_class: String,
    /// Unique token id; two logins in the same second must not mint
    /// byte-identical tokens, since sessions are looked up by fingerprint
    pub jti: String,
    /// Random session correlator, present on refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
}

/// Stateless issuer for access and refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_seconds: u64,
    refresh_seconds: u64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.token_secret.as_bytes()),
            validation,
            access_seconds: config.access_token_seconds,
            refresh_seconds: config.refresh_token_seconds,
        }
    }

    /// Issue a short-lived access token carrying authorization claims.
    pub fn issue_access(&self, account_id: &AccountId, role: Role, verified: bool) -> Result<String> {
        let now = unix_now()?;
        let claims = Claims {
            sub: account_id.to_string(),
            role,
            verified,
            token_class: ACCESS_TOKEN_CLASS.to_string(),
            jti: Uuid::new_v4().to_string(),
            sid: None,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            exp: now + self.access_seconds as usize,
            iat: now,
        };

        self.sign(&claims)
    }

    /// Issue a long-lived refresh token. Returns the token and its random
    /// session correlator.
    pub fn issue_refresh(&self, account_id: &AccountId, role: Role, verified: bool) -> Result<(String, String)> {
        let now = unix_now()?;
        let correlator = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: account_id.to_string(),
            role,
            verified,
            token_class: REFRESH_TOKEN_CLASS.to_string(),
            jti: Uuid::new_v4().to_string(),
            sid: Some(correlator.clone()),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            exp: now + self.refresh_seconds as usize,
            iat: now,
        };

        Ok((self.sign(&claims)?, correlator))
    }

    /// Verify a token's signature, structure, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::auth("Token has expired", AuthErrorType::TokenExpired)
                }
                _ => Error::auth("Token is invalid", AuthErrorType::TokenInvalid),
            })
    }

    /// Access token lifetime in seconds
    pub fn access_expires_in(&self) -> u64 {
        self.access_seconds
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_expires_in(&self) -> u64 {
        self.refresh_seconds
    }

    /// Access token lifetime for timestamp arithmetic
    pub fn access_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_seconds as i64)
    }

    /// Refresh token lifetime for timestamp arithmetic
    pub fn refresh_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_seconds as i64)
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| Error::internal(format!("Failed to sign token: {}", err)))
    }
}

fn unix_now() -> Result<usize> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .map_err(|err| Error::internal(format!("System clock before Unix epoch: {}", err)))
}
