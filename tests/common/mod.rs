#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;

use ridegate::auth::{
    CredentialStore, LoginAttemptGovernor, LoginRequest, LoginService, SessionService,
    TokenIssuer, VerificationService,
};
use ridegate::config::{
    AuthConfig, HashingConfig, LockoutConfig, VerificationConfig,
};
use ridegate::domain::{AccountId, Role};
use ridegate::storage::{
    run_migrations, AuditLogRepository, DbPool, SqlxCredentialRepository, SqlxSessionRepository,
    SqlxVerificationRepository,
};

pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub struct TestHarness {
    pub pool: DbPool,
    pub login: LoginService,
    pub sessions: SessionService,
    pub verification: VerificationService,
    pub governor: LoginAttemptGovernor,
    pub credentials: Arc<SqlxCredentialRepository>,
}

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        token_secret: "integration-test-signing-secret-0123456789".to_string(),
        access_token_seconds: 3600,
        refresh_token_seconds: 86_400,
    }
}

/// Minimal Argon2 work factor keeps the suite fast.
pub fn test_hashing_config() -> HashingConfig {
    HashingConfig { memory_kib: 768, iterations: 1, parallelism: 1 }
}

/// Cooldown disabled so resend flows can run back to back; the cooldown
/// behavior itself gets a dedicated service instance.
pub fn test_verification_config() -> VerificationConfig {
    VerificationConfig { resend_cooldown_seconds: 0, ..VerificationConfig::default() }
}

pub async fn setup() -> TestHarness {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite:file:{}?mode=memory&cache=shared", uuid::Uuid::new_v4()))
        .await
        .expect("create sqlite pool");
    run_migrations(&pool).await.expect("run migrations");

    let audit = Arc::new(AuditLogRepository::new(pool.clone()));
    let credentials = Arc::new(SqlxCredentialRepository::new(pool.clone()));
    let tokens = TokenIssuer::new(&test_auth_config());

    let sessions = SessionService::new(
        Arc::new(SqlxSessionRepository::new(pool.clone())),
        audit.clone(),
        tokens,
    );
    let governor =
        LoginAttemptGovernor::new(credentials.clone(), audit.clone(), LockoutConfig::default());
    let verification = VerificationService::new(
        Arc::new(SqlxVerificationRepository::new(pool.clone())),
        audit.clone(),
        test_verification_config(),
    );
    let login = LoginService::new(
        credentials.clone(),
        CredentialStore::new(&test_hashing_config()),
        governor.clone(),
        sessions.clone(),
        audit,
    );

    TestHarness { pool, login, sessions, verification, governor, credentials }
}

impl TestHarness {
    /// Register a fresh account with the standard test password.
    pub async fn register_account(&self) -> AccountId {
        let account = AccountId::new();
        self.login.register_credential(&account, TEST_PASSWORD).await.expect("register");
        account
    }

    pub fn login_request(&self, account: &AccountId, password: &str) -> LoginRequest {
        LoginRequest {
            account_id: account.to_string(),
            password: password.to_string(),
            role: Role::Passenger,
            verified: true,
            device: "android-13 pixel-7".to_string(),
            client_address: "203.0.113.7".to_string(),
        }
    }
}
