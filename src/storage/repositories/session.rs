//! Session repository for persisted login records.
//!
//! One row per device/login. Rows are never deleted in the hot path;
//! revocation and expiry sweeps flip `active` off so session history keeps
//! its audit value.

use crate::auth::models::{NewSession, Session};
use crate::domain::{AccountId, Role, SessionId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    pub id: String,
    pub account_id: String,
    pub role: String,
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

impl SessionRow {
    fn into_model(self) -> Result<Session> {
        let role = Role::from_str(&self.role).map_err(|_| {
            Error::validation(format!("Unknown role '{}' for session {}", self.role, self.id))
        })?;

        Ok(Session {
            id: SessionId::from_string(self.id),
            account_id: AccountId::from_string(self.account_id),
            role,
            verified: self.verified,
            access_fp: self.access_fp,
            refresh_fp: self.refresh_fp,
            device: self.device,
            client_address: self.client_address,
            issued_at: self.issued_at,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            last_activity_at: self.last_activity_at,
            active: self.active,
        })
    }
}

const SESSION_COLUMNS: &str = "id, account_id, role, verified, access_fp, refresh_fp, device, \
     client_address, issued_at, access_expires_at, refresh_expires_at, last_activity_at, active";

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: NewSession) -> Result<Session>;
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;
    async fn find_by_access_fp(&self, fingerprint: &str) -> Result<Option<Session>>;
    async fn find_by_refresh_fp(&self, fingerprint: &str) -> Result<Option<Session>>;
    /// Store a fresh access fingerprint and expiry after a refresh, bumping
    /// the activity timestamp in the same statement.
    async fn update_access(
        &self,
        id: &SessionId,
        access_fp: String,
        access_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn touch_activity(&self, id: &SessionId, now: DateTime<Utc>) -> Result<()>;
    /// Deactivate the session matching either fingerprint. Returns affected rows.
    async fn deactivate_by_fp(&self, fingerprint: &str) -> Result<u64>;
    async fn deactivate_all(&self, account_id: &AccountId) -> Result<u64>;
    /// Deactivate sessions whose access and refresh windows have both passed.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn count_active_for_account(&self, account_id: &AccountId) -> Result<i64>;
}

#[derive(Debug, Clone)]
pub struct SqlxSessionRepository {
    pool: DbPool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_by_column(&self, column: &str, value: &str) -> Result<Option<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE {} = $1 ORDER BY issued_at DESC LIMIT 1",
            SESSION_COLUMNS, column
        );

        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: format!("Failed to fetch session by {}", column),
            })?;

        row.map(SessionRow::into_model).transpose()
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        sqlx::query(
            "INSERT INTO sessions (id, account_id, role, verified, access_fp, refresh_fp, device, \
             client_address, issued_at, access_expires_at, refresh_expires_at, last_activity_at, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE)",
        )
        .bind(&session.id)
        .bind(&session.account_id)
        .bind(session.role.as_str())
        .bind(session.verified)
        .bind(&session.access_fp)
        .bind(&session.refresh_fp)
        .bind(&session.device)
        .bind(&session.client_address)
        .bind(session.issued_at)
        .bind(session.access_expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to insert session".to_string(),
        })?;

        self.get_session(&session.id).await?.ok_or_else(|| {
            Error::internal(format!("Session '{}' missing after insert", session.id))
        })
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        self.find_by_column("id", id.as_str()).await
    }

    async fn find_by_access_fp(&self, fingerprint: &str) -> Result<Option<Session>> {
        self.find_by_column("access_fp", fingerprint).await
    }

    async fn find_by_refresh_fp(&self, fingerprint: &str) -> Result<Option<Session>> {
        self.find_by_column("refresh_fp", fingerprint).await
    }

    async fn update_access(
        &self,
        id: &SessionId,
        access_fp: String,
        access_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions \
             SET access_fp = $1, access_expires_at = $2, last_activity_at = $3 \
             WHERE id = $4",
        )
        .bind(&access_fp)
        .bind(access_expires_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to update session access token".to_string(),
        })?;
        Ok(())
    }

    async fn touch_activity(&self, id: &SessionId, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_activity_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::Database {
                source: err,
                context: "Failed to update session activity timestamp".to_string(),
            })?;
        Ok(())
    }

    async fn deactivate_by_fp(&self, fingerprint: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET active = FALSE \
             WHERE (access_fp = $1 OR refresh_fp = $1) AND active = TRUE",
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to deactivate session".to_string(),
        })?;
        Ok(result.rows_affected())
    }

    async fn deactivate_all(&self, account_id: &AccountId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET active = FALSE WHERE account_id = $1 AND active = TRUE",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to deactivate account sessions".to_string(),
        })?;
        Ok(result.rows_affected())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET active = FALSE \
             WHERE active = TRUE AND access_expires_at < $1 AND refresh_expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to deactivate expired sessions".to_string(),
        })?;
        Ok(result.rows_affected())
    }

    async fn count_active_for_account(&self, account_id: &AccountId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE account_id = $1 AND active = TRUE",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to count active sessions".to_string(),
        })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_repo() -> SqlxSessionRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!(
                "sqlite:file:{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4()
            ))
            .await
            .expect("create sqlite pool");
        run_migrations(&pool).await.expect("run migrations");
        SqlxSessionRepository::new(pool)
    }

    fn new_session(account_id: &AccountId, access_fp: &str, refresh_fp: &str) -> NewSession {
        let now = Utc::now();
        NewSession {
            id: SessionId::new(),
            account_id: account_id.clone(),
            role: Role::Passenger,
            verified: true,
            access_fp: access_fp.to_string(),
            refresh_fp: refresh_fp.to_string(),
            device: "android-13".to_string(),
            client_address: "10.1.2.3".to_string(),
            issued_at: now,
            access_expires_at: now + Duration::hours(24),
            refresh_expires_at: now + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_by_fingerprints() {
        let repo = setup_repo().await;
        let account = AccountId::new();

        let created = repo.insert_session(new_session(&account, "afp-1", "rfp-1")).await.unwrap();
        assert!(created.active);
        assert_eq!(created.role, Role::Passenger);
        assert_eq!(created.last_activity_at, created.issued_at);

        let by_access = repo.find_by_access_fp("afp-1").await.unwrap().unwrap();
        assert_eq!(by_access.id, created.id);

        let by_refresh = repo.find_by_refresh_fp("rfp-1").await.unwrap().unwrap();
        assert_eq!(by_refresh.id, created.id);

        assert!(repo.find_by_access_fp("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_access_replaces_fingerprint() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let session = repo.insert_session(new_session(&account, "afp-old", "rfp")).await.unwrap();

        let now = Utc::now();
        let new_expiry = now + Duration::hours(24);
        repo.update_access(&session.id, "afp-new".into(), new_expiry, now).await.unwrap();

        assert!(repo.find_by_access_fp("afp-old").await.unwrap().is_none());
        let updated = repo.find_by_access_fp("afp-new").await.unwrap().unwrap();
        assert_eq!(updated.id, session.id);
        assert!(updated.last_activity_at >= session.last_activity_at);
    }

    #[tokio::test]
    async fn deactivate_by_either_fingerprint_is_idempotent() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        repo.insert_session(new_session(&account, "afp", "rfp")).await.unwrap();

        assert_eq!(repo.deactivate_by_fp("rfp").await.unwrap(), 1);
        // Second call finds nothing active, which is not an error
        assert_eq!(repo.deactivate_by_fp("rfp").await.unwrap(), 0);
        assert_eq!(repo.deactivate_by_fp("afp").await.unwrap(), 0);

        let session = repo.find_by_refresh_fp("rfp").await.unwrap().unwrap();
        assert!(!session.active);
    }

    #[tokio::test]
    async fn deactivate_all_spares_other_accounts() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let other = AccountId::new();
        repo.insert_session(new_session(&account, "a1", "r1")).await.unwrap();
        repo.insert_session(new_session(&account, "a2", "r2")).await.unwrap();
        repo.insert_session(new_session(&other, "a3", "r3")).await.unwrap();

        assert_eq!(repo.deactivate_all(&account).await.unwrap(), 2);
        assert_eq!(repo.count_active_for_account(&account).await.unwrap(), 0);
        assert_eq!(repo.count_active_for_account(&other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expiry_sweep_requires_both_windows_passed() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let now = Utc::now();

        // Access expired, refresh still open: must survive the sweep
        let mut refresh_open = new_session(&account, "a1", "r1");
        refresh_open.access_expires_at = now - Duration::hours(1);
        refresh_open.refresh_expires_at = now + Duration::days(1);
        repo.insert_session(refresh_open).await.unwrap();

        // Both windows passed: swept
        let mut both_expired = new_session(&account, "a2", "r2");
        both_expired.access_expires_at = now - Duration::days(8);
        both_expired.refresh_expires_at = now - Duration::days(1);
        repo.insert_session(both_expired).await.unwrap();

        assert_eq!(repo.deactivate_expired(now).await.unwrap(), 1);
        assert!(repo.find_by_refresh_fp("r1").await.unwrap().unwrap().active);
        assert!(!repo.find_by_refresh_fp("r2").await.unwrap().unwrap().active);
    }
}
