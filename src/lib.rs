//! # RideGate
//!
//! Authentication and session lifecycle engine for the RideGate mobility
//! platform. The HTTP layer, ride matching, fares and payments live in
//! sibling services; this crate owns the security-critical core they all
//! call into:
//!
//! - **Credential store**: Argon2id password hashing and verification
//! - **Token issuer**: signed access/refresh bearer tokens with fixed
//!   issuer and audience
//! - **Login attempt governor**: consecutive-failure counting and timed
//!   lockout with race-free counter updates
//! - **Session registry**: one persisted row per device login, the
//!   authority over whether a token is still honored
//! - **Verification code engine**: single-use, expiring, attempt-limited
//!   codes for email/SMS verification, password reset and two-factor
//! - **Rate limiter**: sliding-window counters with refund-on-success for
//!   sensitive endpoints
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ridegate::auth::{
//!     CredentialStore, LoginAttemptGovernor, LoginService, SessionService, TokenIssuer,
//! };
//! use ridegate::storage::{create_pool, AuditLogRepository, SqlxCredentialRepository};
//! use ridegate::{AppConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let pool = create_pool(&config.database).await?;
//!
//!     let audit = Arc::new(AuditLogRepository::new(pool.clone()));
//!     let tokens = TokenIssuer::new(&config.auth);
//!     let sessions = SessionService::with_sqlx(pool.clone(), audit.clone(), tokens);
//!     let governor =
//!         LoginAttemptGovernor::with_sqlx(pool.clone(), audit.clone(), config.lockout.clone());
//!     let login = LoginService::new(
//!         Arc::new(SqlxCredentialRepository::new(pool.clone())),
//!         CredentialStore::new(&config.hashing),
//!         governor,
//!         sessions,
//!         audit,
//!     );
//!
//!     // Hand `login` (and friends) to the HTTP layer.
//!     let _ = login;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{AuthErrorType, Error, Result, VerificationErrorType};
pub use observability::init_observability;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "ridegate");
    }
}
