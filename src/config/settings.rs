//! # Configuration Settings
//!
//! Environment-sourced configuration for the RideGate authentication core.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::auth::models::VerificationPurpose;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Token issuing configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Failed-login lockout configuration
    #[validate(nested)]
    pub lockout: LockoutConfig,

    /// Verification code configuration
    #[validate(nested)]
    pub verification: VerificationConfig,

    /// Rate limit windows per endpoint class
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Password hashing parameters
    #[validate(nested)]
    pub hashing: HashingConfig,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Create configuration from environment variables, reading a `.env`
    /// file first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env()?,
            lockout: LockoutConfig::from_env(),
            verification: VerificationConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            hashing: HashingConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic beyond what the validator derive can express
    fn validate_custom(&self) -> Result<()> {
        if self.auth.access_token_seconds >= self.auth.refresh_token_seconds {
            return Err(Error::validation(
                "Access token lifetime must be shorter than refresh token lifetime",
            ));
        }

        if !self.database.url.starts_with("sqlite://") {
            return Err(Error::validation("Database URL must start with 'sqlite://'"));
        }

        if self.verification.two_factor_expiry_minutes > self.verification.expiry_minutes {
            return Err(Error::validation(
                "Two-factor code expiry cannot exceed the general verification expiry",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/ridegate.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_seconds: env_parse(
                "DATABASE_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            ),
            idle_timeout_seconds: env_parse(
                "DATABASE_IDLE_TIMEOUT_SECONDS",
                defaults.idle_timeout_seconds,
            ),
            auto_migrate: std::env::var("DATABASE_AUTO_MIGRATE")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.auto_migrate),
        }
    }
}

/// Token issuing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// Secret for token signing/verification
    #[validate(length(min = 32, message = "Token secret must be at least 32 characters long"))]
    pub token_secret: String,

    /// Access token lifetime in seconds (default 24 hours)
    #[validate(range(
        min = 60,
        max = 604800,
        message = "Access token lifetime must be between 1 minute and 7 days"
    ))]
    pub access_token_seconds: u64,

    /// Refresh token lifetime in seconds (default 7 days)
    #[validate(range(
        min = 3600,
        max = 7776000,
        message = "Refresh token lifetime must be between 1 hour and 90 days"
    ))]
    pub refresh_token_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "ridegate-default-secret-please-change-in-production".to_string(),
            access_token_seconds: 86_400,   // 24 hours
            refresh_token_seconds: 604_800, // 7 days
        }
    }
}

impl AuthConfig {
    /// Get access token lifetime as Duration
    pub fn access_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.access_token_seconds)
    }

    /// Get refresh token lifetime as Duration
    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.refresh_token_seconds)
    }

    /// Create AuthConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let token_secret = std::env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| Error::validation("AUTH_TOKEN_SECRET environment variable not set"))?;

        Ok(Self {
            token_secret,
            access_token_seconds: env_parse(
                "AUTH_ACCESS_TOKEN_SECONDS",
                defaults.access_token_seconds,
            ),
            refresh_token_seconds: env_parse(
                "AUTH_REFRESH_TOKEN_SECONDS",
                defaults.refresh_token_seconds,
            ),
        })
    }
}

/// Failed-login lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LockoutConfig {
    /// Consecutive failures before the account locks
    #[validate(range(min = 1, max = 20, message = "Max login attempts must be between 1 and 20"))]
    pub max_login_attempts: u32,

    /// Lockout duration in minutes
    #[validate(range(
        min = 1,
        max = 1440,
        message = "Lockout duration must be between 1 minute and 24 hours"
    ))]
    pub lockout_minutes: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self { max_login_attempts: 5, lockout_minutes: 15 }
    }
}

impl LockoutConfig {
    /// Get lockout duration as chrono Duration for timestamp arithmetic
    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lockout_minutes as i64)
    }

    /// Create LockoutConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_login_attempts: env_parse("AUTH_MAX_LOGIN_ATTEMPTS", defaults.max_login_attempts),
            lockout_minutes: env_parse("AUTH_LOCKOUT_MINUTES", defaults.lockout_minutes),
        }
    }
}

/// Verification code configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerificationConfig {
    /// Code expiry in minutes for email/SMS/password-reset purposes
    #[validate(range(min = 1, max = 1440, message = "Expiry must be between 1 minute and 24 hours"))]
    pub expiry_minutes: u64,

    /// Code expiry in minutes for two-factor challenges
    #[validate(range(
        min = 1,
        max = 60,
        message = "Two-factor expiry must be between 1 and 60 minutes"
    ))]
    pub two_factor_expiry_minutes: u64,

    /// Mismatched guesses allowed per record
    #[validate(range(min = 1, max = 10, message = "Max attempts must be between 1 and 10"))]
    pub max_attempts: u32,

    /// Minimum seconds between resends for the same purpose
    #[validate(range(max = 3600, message = "Resend cooldown cannot exceed 1 hour"))]
    pub resend_cooldown_seconds: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 15,
            two_factor_expiry_minutes: 5,
            max_attempts: 3,
            resend_cooldown_seconds: 60,
        }
    }
}

impl VerificationConfig {
    /// Code expiry for the given purpose
    pub fn expiry_for(&self, purpose: VerificationPurpose) -> chrono::Duration {
        let minutes = match purpose {
            VerificationPurpose::TwoFactor => self.two_factor_expiry_minutes,
            _ => self.expiry_minutes,
        };
        chrono::Duration::minutes(minutes as i64)
    }

    /// Resend cooldown as chrono Duration
    pub fn resend_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.resend_cooldown_seconds as i64)
    }

    /// Create VerificationConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            expiry_minutes: env_parse("VERIFICATION_EXPIRY_MINUTES", defaults.expiry_minutes),
            two_factor_expiry_minutes: env_parse(
                "VERIFICATION_TWO_FACTOR_MINUTES",
                defaults.two_factor_expiry_minutes,
            ),
            max_attempts: env_parse("VERIFICATION_MAX_ATTEMPTS", defaults.max_attempts),
            resend_cooldown_seconds: env_parse(
                "VERIFICATION_RESEND_COOLDOWN_SECONDS",
                defaults.resend_cooldown_seconds,
            ),
        }
    }
}

/// Sliding-window rate limit settings per endpoint class
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    /// Window in seconds for general API endpoints
    #[validate(range(min = 1, message = "Window must be at least 1 second"))]
    pub general_window_seconds: u64,

    /// Max requests per window for general API endpoints
    #[validate(range(min = 1, message = "Max requests must be at least 1"))]
    pub general_max_requests: u32,

    /// Window in seconds for login/refresh endpoints
    #[validate(range(min = 1, message = "Window must be at least 1 second"))]
    pub auth_window_seconds: u64,

    /// Max requests per window for login/refresh endpoints
    #[validate(range(min = 1, message = "Max requests must be at least 1"))]
    pub auth_max_requests: u32,

    /// Window in seconds for verification issue/resend endpoints
    #[validate(range(min = 1, message = "Window must be at least 1 second"))]
    pub verification_window_seconds: u64,

    /// Max requests per window for verification issue/resend endpoints
    #[validate(range(min = 1, message = "Max requests must be at least 1"))]
    pub verification_max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general_window_seconds: 900,
            general_max_requests: 100,
            auth_window_seconds: 900,
            auth_max_requests: 10,
            verification_window_seconds: 600,
            verification_max_requests: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn general_policy(&self) -> crate::auth::rate_limit::RateLimitPolicy {
        crate::auth::rate_limit::RateLimitPolicy {
            window: Duration::from_secs(self.general_window_seconds),
            max_requests: self.general_max_requests,
        }
    }

    /// Policy for login/refresh endpoints; callers refund on success
    pub fn auth_policy(&self) -> crate::auth::rate_limit::RateLimitPolicy {
        crate::auth::rate_limit::RateLimitPolicy {
            window: Duration::from_secs(self.auth_window_seconds),
            max_requests: self.auth_max_requests,
        }
    }

    pub fn verification_policy(&self) -> crate::auth::rate_limit::RateLimitPolicy {
        crate::auth::rate_limit::RateLimitPolicy {
            window: Duration::from_secs(self.verification_window_seconds),
            max_requests: self.verification_max_requests,
        }
    }

    /// Create RateLimitConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            general_window_seconds: env_parse(
                "RATE_LIMIT_GENERAL_WINDOW_SECONDS",
                defaults.general_window_seconds,
            ),
            general_max_requests: env_parse(
                "RATE_LIMIT_GENERAL_MAX_REQUESTS",
                defaults.general_max_requests,
            ),
            auth_window_seconds: env_parse(
                "RATE_LIMIT_AUTH_WINDOW_SECONDS",
                defaults.auth_window_seconds,
            ),
            auth_max_requests: env_parse("RATE_LIMIT_AUTH_MAX_REQUESTS", defaults.auth_max_requests),
            verification_window_seconds: env_parse(
                "RATE_LIMIT_VERIFICATION_WINDOW_SECONDS",
                defaults.verification_window_seconds,
            ),
            verification_max_requests: env_parse(
                "RATE_LIMIT_VERIFICATION_MAX_REQUESTS",
                defaults.verification_max_requests,
            ),
        }
    }
}

/// Argon2id parameters for password hashing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HashingConfig {
    /// Memory cost in KiB
    #[validate(range(min = 8, max = 1048576, message = "Memory cost must be between 8 KiB and 1 GiB"))]
    pub memory_kib: u32,

    /// Iteration count
    #[validate(range(min = 1, max = 64, message = "Iterations must be between 1 and 64"))]
    pub iterations: u32,

    /// Parallelism degree
    #[validate(range(min = 1, max = 16, message = "Parallelism must be between 1 and 16"))]
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        // Argon2id parameters aligned with the argon2 crate defaults
        Self { memory_kib: 19_456, iterations: 2, parallelism: 1 }
    }
}

impl HashingConfig {
    /// Create HashingConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_kib: env_parse("HASHING_MEMORY_KIB", defaults.memory_kib),
            iterations: env_parse("HASHING_ITERATIONS", defaults.iterations),
            parallelism: env_parse("HASHING_PARALLELISM", defaults.parallelism),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Default log level filter when RUST_LOG is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON
    pub json_logs: bool,

    /// Install the Prometheus metrics exporter
    pub enable_metrics: bool,

    /// Listen address for the Prometheus scrape endpoint
    #[validate(length(min = 1, message = "Metrics address cannot be empty"))]
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            enable_metrics: false,
            metrics_address: "127.0.0.1:9797".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: std::env::var("LOG_JSON")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.json_logs),
            enable_metrics: std::env::var("METRICS_ENABLED")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.enable_metrics),
            metrics_address: std::env::var("METRICS_ADDRESS").unwrap_or(defaults.metrics_address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_access_lifetime_longer_than_refresh() {
        let config = AppConfig {
            auth: AuthConfig {
                access_token_seconds: 604_800,
                refresh_token_seconds: 86_400,
                ..AuthConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_token_secret() {
        let config = AppConfig {
            auth: AuthConfig { token_secret: "short".to_string(), ..AuthConfig::default() },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_sqlite_database_url() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: "mysql://localhost/ridegate".to_string(),
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn two_factor_expiry_is_shorter() {
        let config = VerificationConfig::default();
        assert!(
            config.expiry_for(VerificationPurpose::TwoFactor)
                < config.expiry_for(VerificationPurpose::Email)
        );
    }

    #[test]
    fn lockout_defaults_match_policy() {
        let config = LockoutConfig::default();
        assert_eq!(config.max_login_attempts, 5);
        assert_eq!(config.lockout_duration(), chrono::Duration::minutes(15));
    }
}
