//! # Database Migration Management
//!
//! Schema evolution via SQL migrations embedded in the binary and applied in
//! version order. Applied versions are recorded in `schema_migrations` so
//! startup is idempotent.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use tracing::{debug, info};

/// Embedded migrations, ordered by version.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "create credentials", include_str!("../../migrations/0001_create_credentials.sql")),
    (2, "create sessions", include_str!("../../migrations/0002_create_sessions.sql")),
    (
        3,
        "create verification records",
        include_str!("../../migrations/0003_create_verification_records.sql"),
    ),
    (4, "create audit log", include_str!("../../migrations/0004_create_audit_log.sql")),
];

/// Run all pending migrations against the pool
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    ensure_ledger(pool).await?;
    let current = get_migration_version(pool).await?;

    for (version, description, sql) in MIGRATIONS {
        if *version <= current {
            debug!(version, "migration already applied, skipping");
            continue;
        }

        let mut tx = pool.begin().await.map_err(|err| Error::Database {
            source: err,
            context: format!("Failed to begin transaction for migration {}", version),
        })?;

        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|err| Error::Database {
            source: err,
            context: format!("Failed to apply migration {} ({})", version, description),
        })?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, description, installed_on) \
             VALUES ($1, $2, CURRENT_TIMESTAMP)",
        )
        .bind(version)
        .bind(description)
        .execute(&mut *tx)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: format!("Failed to record migration {}", version),
        })?;

        tx.commit().await.map_err(|err| Error::Database {
            source: err,
            context: format!("Failed to commit migration {}", version),
        })?;

        info!(version, description, "applied database migration");
    }

    Ok(())
}

/// Highest applied migration version, 0 when none have run
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to read schema_migrations ledger".to_string(),
            })?;
    Ok(version.unwrap_or(0))
}

async fn ensure_ledger(pool: &DbPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            installed_on DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .map_err(|err| Error::Database {
        source: err,
        context: "Failed to create schema_migrations ledger".to_string(),
    })?;
    Ok(())
}
