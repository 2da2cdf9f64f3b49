//! # Configuration Management
//!
//! Environment-sourced configuration for the authentication core. The
//! embedding service builds an [`AppConfig`] once at startup and hands the
//! relevant sections to each component.

mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, HashingConfig, LockoutConfig, ObservabilityConfig,
    RateLimitConfig, VerificationConfig,
};
