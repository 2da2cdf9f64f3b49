//! Credential repository for password hashes and failure counters.
//!
//! The failure counter is the one place a read-then-write pair would race
//! under concurrent logins, so `record_failure` is a single conditional
//! UPDATE that increments and applies the lockout in the same statement.

use crate::auth::models::{Credential, LockoutState, NewCredential};
use crate::domain::AccountId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    pub account_id: String,
    pub password_hash: String,
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn into_model(self) -> Credential {
        Credential {
            account_id: AccountId::from_string(self.account_id),
            password_hash: self.password_hash,
            failed_attempts: self.failed_attempts.max(0) as u32,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create_credential(&self, credential: NewCredential) -> Result<Credential>;
    async fn find_by_account(&self, account_id: &AccountId) -> Result<Option<Credential>>;
    async fn update_password_hash(&self, account_id: &AccountId, password_hash: String)
        -> Result<()>;
    /// Atomically increment the failure counter, applying `locked_until` when
    /// the new count reaches `threshold`. Returns the post-update state, or
    /// `None` when the account has no credential row.
    async fn record_failure(
        &self,
        account_id: &AccountId,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<LockoutState>>;
    /// Reset the failure counter and clear any lockout unconditionally.
    async fn reset_failures(&self, account_id: &AccountId) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqlxCredentialRepository {
    pool: DbPool,
}

impl SqlxCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for SqlxCredentialRepository {
    async fn create_credential(&self, credential: NewCredential) -> Result<Credential> {
        sqlx::query(
            "INSERT INTO credentials (account_id, password_hash, failed_attempts, locked_until, created_at, updated_at) \
             VALUES ($1, $2, 0, NULL, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        )
        .bind(&credential.account_id)
        .bind(&credential.password_hash)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to insert credential".to_string(),
        })?;

        self.find_by_account(&credential.account_id).await?.ok_or_else(|| {
            Error::internal(format!(
                "Credential for account '{}' missing after insert",
                credential.account_id
            ))
        })
    }

    async fn find_by_account(&self, account_id: &AccountId) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT account_id, password_hash, failed_attempts, locked_until, created_at, updated_at \
             FROM credentials WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to fetch credential".to_string(),
        })?;

        Ok(row.map(CredentialRow::into_model))
    }

    async fn update_password_hash(
        &self,
        account_id: &AccountId,
        password_hash: String,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE credentials SET password_hash = $1, updated_at = CURRENT_TIMESTAMP \
             WHERE account_id = $2",
        )
        .bind(&password_hash)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to update password hash".to_string(),
        })?;
        Ok(())
    }

    async fn record_failure(
        &self,
        account_id: &AccountId,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<LockoutState>> {
        #[derive(Debug, FromRow)]
        struct FailureRow {
            failed_attempts: i64,
            locked_until: Option<DateTime<Utc>>,
        }

        let row: Option<FailureRow> = sqlx::query_as(
            "UPDATE credentials \
             SET failed_attempts = failed_attempts + 1, \
                 locked_until = CASE \
                     WHEN failed_attempts + 1 >= $2 THEN $3 \
                     ELSE locked_until \
                 END, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE account_id = $1 \
             RETURNING failed_attempts, locked_until",
        )
        .bind(account_id)
        .bind(threshold as i64)
        .bind(locked_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to record login failure".to_string(),
        })?;

        Ok(row.map(|r| LockoutState {
            failed_attempts: r.failed_attempts.max(0) as u32,
            locked_until: r.locked_until,
        }))
    }

    async fn reset_failures(&self, account_id: &AccountId) -> Result<()> {
        sqlx::query(
            "UPDATE credentials \
             SET failed_attempts = 0, locked_until = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE account_id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to reset failure counter".to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_repo() -> SqlxCredentialRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!(
                "sqlite:file:{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4()
            ))
            .await
            .expect("create sqlite pool");
        run_migrations(&pool).await.expect("run migrations");
        SqlxCredentialRepository::new(pool)
    }

    #[tokio::test]
    async fn create_and_fetch_credential() {
        let repo = setup_repo().await;
        let account = AccountId::new();

        let created = repo
            .create_credential(NewCredential {
                account_id: account.clone(),
                password_hash: "$argon2id$test".into(),
            })
            .await
            .unwrap();

        assert_eq!(created.failed_attempts, 0);
        assert!(created.locked_until.is_none());

        let fetched = repo.find_by_account(&account).await.unwrap().unwrap();
        assert_eq!(fetched.password_hash, "$argon2id$test");

        assert!(repo.find_by_account(&AccountId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_counter_locks_at_threshold() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        repo.create_credential(NewCredential {
            account_id: account.clone(),
            password_hash: "h".into(),
        })
        .await
        .unwrap();

        let until = Utc::now() + chrono::Duration::minutes(15);

        for expected in 1..=4u32 {
            let state = repo.record_failure(&account, 5, until).await.unwrap().unwrap();
            assert_eq!(state.failed_attempts, expected);
            assert!(state.locked_until.is_none(), "locked before threshold");
        }

        let state = repo.record_failure(&account, 5, until).await.unwrap().unwrap();
        assert_eq!(state.failed_attempts, 5);
        assert!(state.locked_until.is_some(), "threshold crossing must lock");
    }

    #[tokio::test]
    async fn reset_clears_counter_and_lock() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        repo.create_credential(NewCredential {
            account_id: account.clone(),
            password_hash: "h".into(),
        })
        .await
        .unwrap();

        let until = Utc::now() + chrono::Duration::minutes(15);
        for _ in 0..5 {
            repo.record_failure(&account, 5, until).await.unwrap();
        }

        repo.reset_failures(&account).await.unwrap();
        let credential = repo.find_by_account(&account).await.unwrap().unwrap();
        assert_eq!(credential.failed_attempts, 0);
        assert!(credential.locked_until.is_none());
    }

    #[tokio::test]
    async fn record_failure_for_unknown_account_is_none() {
        let repo = setup_repo().await;
        let state =
            repo.record_failure(&AccountId::new(), 5, Utc::now()).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn concurrent_failures_reach_threshold() {
        let repo = std::sync::Arc::new(setup_repo().await);
        let account = AccountId::new();
        repo.create_credential(NewCredential {
            account_id: account.clone(),
            password_hash: "h".into(),
        })
        .await
        .unwrap();

        let until = Utc::now() + chrono::Duration::minutes(15);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let repo = repo.clone();
            let account = account.clone();
            handles.push(tokio::spawn(async move {
                repo.record_failure(&account, 5, until).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let credential = repo.find_by_account(&account).await.unwrap().unwrap();
        assert_eq!(credential.failed_attempts, 5);
        assert!(credential.locked_until.is_some(), "no failure may be lost under concurrency");
    }
}
