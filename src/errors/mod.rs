//! # Error Types
//!
//! Error types for the RideGate authentication core using `thiserror`.
//! Every recoverable authentication outcome is a typed variant so callers
//! can branch on it; backing-store failures are the only infrastructure
//! errors and carry their `sqlx` source.

use std::fmt;

/// Custom result type for RideGate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the RideGate authentication core
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Authentication and session errors
    #[error("Authentication error: {message}")]
    Auth { message: String, error_type: AuthErrorType },

    /// Verification code errors
    #[error("Verification error: {message}")]
    Verification { message: String, error_type: VerificationErrorType },

    /// Rate limiting errors
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String, retry_after_ms: Option<u64> },

    /// Validation errors (invalid caller input)
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorType {
    InvalidCredentials,
    AccountLocked,
    MissingToken,
    TokenInvalid,
    TokenExpired,
    SessionInvalid,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidCredentials => write!(f, "invalid_credentials"),
            AuthErrorType::AccountLocked => write!(f, "account_locked"),
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::TokenInvalid => write!(f, "token_invalid"),
            AuthErrorType::TokenExpired => write!(f, "token_expired"),
            AuthErrorType::SessionInvalid => write!(f, "session_invalid"),
        }
    }
}

/// Verification error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationErrorType {
    NotFound,
    Expired,
    AlreadyUsed,
    AttemptsExhausted,
    Mismatch,
}

impl fmt::Display for VerificationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationErrorType::NotFound => write!(f, "not_found"),
            VerificationErrorType::Expired => write!(f, "expired"),
            VerificationErrorType::AlreadyUsed => write!(f, "already_used"),
            VerificationErrorType::AttemptsExhausted => write!(f, "attempts_exhausted"),
            VerificationErrorType::Mismatch => write!(f, "mismatch"),
        }
    }
}

impl Error {
    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create a verification error
    pub fn verification<S: Into<String>>(message: S, error_type: VerificationErrorType) -> Self {
        Self::Verification { message: message.into(), error_type }
    }

    /// Create a rate limit error
    pub fn rate_limited<S: Into<String>>(message: S, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimit { message: message.into(), retry_after_ms }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create an internal error with source
    pub fn internal_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(source) }
    }

    /// Check whether this is an authentication error of the given subtype
    pub fn is_auth(&self, expected: AuthErrorType) -> bool {
        matches!(self, Error::Auth { error_type, .. } if *error_type == expected)
    }

    /// Check whether this is a verification error of the given subtype
    pub fn is_verification(&self, expected: VerificationErrorType) -> bool {
        matches!(self, Error::Verification { error_type, .. } if *error_type == expected)
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation { message: errors.to_string(), field: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_construction() {
        let err = Error::auth("bad password", AuthErrorType::InvalidCredentials);
        assert!(err.is_auth(AuthErrorType::InvalidCredentials));
        assert!(!err.is_auth(AuthErrorType::AccountLocked));
        assert_eq!(err.to_string(), "Authentication error: bad password");
    }

    #[test]
    fn verification_error_construction() {
        let err = Error::verification("code expired", VerificationErrorType::Expired);
        assert!(err.is_verification(VerificationErrorType::Expired));
        assert!(!err.is_verification(VerificationErrorType::Mismatch));
    }

    #[test]
    fn rate_limit_carries_retry_hint() {
        let err = Error::rate_limited("too many requests", Some(1500));
        match err {
            Error::RateLimit { retry_after_ms, .. } => assert_eq!(retry_after_ms, Some(1500)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_type_display() {
        assert_eq!(AuthErrorType::AccountLocked.to_string(), "account_locked");
        assert_eq!(VerificationErrorType::AttemptsExhausted.to_string(), "attempts_exhausted");
    }
}
