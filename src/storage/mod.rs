//! # Storage and Persistence
//!
//! Database connectivity and persistence layer for the authentication
//! core's credential, session, verification and audit records.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use migrations::{get_migration_version, run_migrations};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    AuditEvent, AuditLogRepository, CredentialRepository, SessionRepository,
    SqlxCredentialRepository, SqlxSessionRepository, SqlxVerificationRepository,
    VerificationRepository,
};

use crate::errors::{Error, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| Error::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}
