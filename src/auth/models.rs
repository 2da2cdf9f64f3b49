//! Data models used by the RideGate authentication core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::domain::{AccountId, Role, SessionId, VerificationId};

/// Purpose of a verification record. A code issued for one purpose is never
/// honored for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    Email,
    Sms,
    PasswordReset,
    TwoFactor,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::Email => "email",
            VerificationPurpose::Sms => "sms",
            VerificationPurpose::PasswordReset => "password_reset",
            VerificationPurpose::TwoFactor => "two_factor",
        }
    }
}

impl Display for VerificationPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VerificationPurpose {
    type Err = VerificationPurposeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(VerificationPurpose::Email),
            "sms" => Ok(VerificationPurpose::Sms),
            "password_reset" => Ok(VerificationPurpose::PasswordReset),
            "two_factor" => Ok(VerificationPurpose::TwoFactor),
            other => Err(VerificationPurposeParseError(other.to_string())),
        }
    }
}

/// Error returned when verification purpose parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid verification purpose: {0}")]
pub struct VerificationPurposeParseError(pub String);

/// Stored credential for one account.
#[derive(Debug, Clone)]
pub struct Credential {
    pub account_id: AccountId,
    pub password_hash: String,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the lockout window is currently in effect.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }
}

/// New credential database payload.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub account_id: AccountId,
    pub password_hash: String,
}

/// Failure-counter state returned by the atomic failure update.
#[derive(Debug, Clone, Copy)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Stored representation of one authenticated device/login.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    pub role: Role,
    pub verified: bool,
    pub access_fp: String,
    pub refresh_fp: String,
    pub device: String,
    pub client_address: String,
    pub issued_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub active: bool,
}

impl Session {
    /// Usable for authorization: active and the access window has not passed.
    pub fn can_authorize(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.access_expires_at
    }

    /// Eligible for refresh: active and the refresh window has not passed.
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.refresh_expires_at
    }
}

/// New session database payload.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub account_id: AccountId,
    pub role: Role,
    pub verified: bool,
    pub access_fp: String,
    pub refresh_fp: String,
    pub device: String,
    pub client_address: String,
    pub issued_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Stored single-use verification code record.
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub id: VerificationId,
    pub account_id: AccountId,
    pub purpose: VerificationPurpose,
    pub code: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// New verification record database payload.
#[derive(Debug, Clone)]
pub struct NewVerificationRecord {
    pub id: VerificationId,
    pub account_id: AccountId,
    pub purpose: VerificationPurpose,
    pub code: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_attempts: u32,
}

/// Login request payload from the HTTP layer. The account lookup (phone or
/// email to account id, role, verified flag) happens upstream.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128, message = "Account id must be 1-128 characters"))]
    pub account_id: String,

    #[validate(length(min = 1, max = 1024, message = "Password must be 1-1024 characters"))]
    pub password: String,

    pub role: Role,
    pub verified: bool,

    #[validate(length(max = 256, message = "Device descriptor too long"))]
    pub device: String,

    #[validate(length(max = 64, message = "Client address too long"))]
    pub client_address: String,
}

/// Tokens handed back to the caller on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub access_expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
}

/// New access token minted from a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedAccess {
    pub access_token: String,
    /// Seconds until the access token expires
    pub access_expires_in: u64,
}

/// Request-scoped identity handed to the HTTP layer for downstream
/// authorization decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    pub account_id: AccountId,
    pub role: Role,
    pub verified: bool,
    pub session_id: SessionId,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub auth: AuthenticationResult,
    pub session: IssuedSession,
}

/// Artifacts from issuing a verification code. `code` and `opaque_token` are
/// returned exactly once; only the code and a hash of the token persist.
#[derive(Debug, Clone)]
pub struct IssuedVerification {
    pub record_id: VerificationId,
    pub code: String,
    pub opaque_token: String,
    pub expires_at: DateTime<Utc>,
}
