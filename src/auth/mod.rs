//! Authentication and session lifecycle engine.
//!
//! Components, leaf-first: credential store, token issuer, login attempt
//! governor, session registry, verification code engine, and the rate
//! limiter guarding sensitive endpoints. `LoginService` glues the login
//! path together in the one order that is safe.

pub mod credentials;
pub mod delivery;
pub mod hashing;
pub mod lockout;
pub mod login_service;
pub mod models;
pub mod rate_limit;
pub mod session_service;
pub mod tokens;
pub mod verification_service;

pub use credentials::CredentialStore;
pub use delivery::{EmailSender, LogSender, SmsSender};
pub use lockout::LoginAttemptGovernor;
pub use login_service::LoginService;
pub use models::{
    AuthenticationResult, IssuedSession, IssuedVerification, LoginOutcome, LoginRequest,
    RefreshedAccess, VerificationPurpose,
};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use session_service::SessionService;
pub use tokens::{Claims, TokenIssuer};
pub use verification_service::VerificationService;
