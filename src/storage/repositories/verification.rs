//! Verification record repository.
//!
//! Attempt counting and consumption are guarded UPDATEs so two concurrent
//! guesses cannot both slip past the attempt limit or both consume the code.

use crate::auth::models::{NewVerificationRecord, VerificationPurpose, VerificationRecord};
use crate::domain::{AccountId, VerificationId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
struct VerificationRow {
    pub id: String,
    pub account_id: String,
    pub purpose: String,
    pub code: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl VerificationRow {
    fn into_model(self) -> Result<VerificationRecord> {
        let purpose = VerificationPurpose::from_str(&self.purpose).map_err(|_| {
            Error::validation(format!(
                "Unknown verification purpose '{}' for record {}",
                self.purpose, self.id
            ))
        })?;

        Ok(VerificationRecord {
            id: VerificationId::from_string(self.id),
            account_id: AccountId::from_string(self.account_id),
            purpose,
            code: self.code,
            token_hash: self.token_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
            attempts: self.attempts.max(0) as u32,
            max_attempts: self.max_attempts.max(0) as u32,
            used: self.used,
            used_at: self.used_at,
        })
    }
}

const VERIFICATION_COLUMNS: &str = "id, account_id, purpose, code, token_hash, created_at, \
     expires_at, attempts, max_attempts, used, used_at";

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn insert(&self, record: NewVerificationRecord) -> Result<VerificationRecord>;
    async fn get(&self, id: &VerificationId) -> Result<Option<VerificationRecord>>;
    /// Most recent record for (account, purpose); stale records are ignored,
    /// never mutated retroactively.
    async fn find_latest(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationRecord>>;
    /// Count a mismatched guess. Returns the new attempt count, or `None`
    /// when the record was already used or exhausted by a concurrent guess.
    async fn record_mismatch(&self, id: &VerificationId) -> Result<Option<u32>>;
    /// Consume the record on a matching guess. The guard re-checks code,
    /// used flag, attempt budget and expiry so this succeeds at most once.
    async fn consume(
        &self,
        id: &VerificationId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Consume by opaque token hash instead of code, same guards.
    async fn consume_by_token_hash(
        &self,
        id: &VerificationId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    /// Mark any pending record for the purpose used (without success
    /// semantics) so older codes die when a new one is requested.
    async fn supersede_pending(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct SqlxVerificationRepository {
    pool: DbPool,
}

impl SqlxVerificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationRepository for SqlxVerificationRepository {
    async fn insert(&self, record: NewVerificationRecord) -> Result<VerificationRecord> {
        sqlx::query(
            "INSERT INTO verification_records (id, account_id, purpose, code, token_hash, \
             created_at, expires_at, attempts, max_attempts, used, used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, FALSE, NULL)",
        )
        .bind(&record.id)
        .bind(&record.account_id)
        .bind(record.purpose.as_str())
        .bind(&record.code)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.max_attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to insert verification record".to_string(),
        })?;

        self.get(&record.id).await?.ok_or_else(|| {
            Error::internal(format!("Verification record '{}' missing after insert", record.id))
        })
    }

    async fn get(&self, id: &VerificationId) -> Result<Option<VerificationRecord>> {
        let row: Option<VerificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM verification_records WHERE id = $1",
            VERIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to fetch verification record".to_string(),
        })?;

        row.map(VerificationRow::into_model).transpose()
    }

    async fn find_latest(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationRecord>> {
        let row: Option<VerificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM verification_records \
             WHERE account_id = $1 AND purpose = $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            VERIFICATION_COLUMNS
        ))
        .bind(account_id)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to fetch latest verification record".to_string(),
        })?;

        row.map(VerificationRow::into_model).transpose()
    }

    async fn record_mismatch(&self, id: &VerificationId) -> Result<Option<u32>> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE verification_records \
             SET attempts = attempts + 1 \
             WHERE id = $1 AND used = FALSE AND attempts < max_attempts \
             RETURNING attempts",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to record verification mismatch".to_string(),
        })?;

        Ok(attempts.map(|a| a.max(0) as u32))
    }

    async fn consume(&self, id: &VerificationId, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE verification_records \
             SET used = TRUE, used_at = $1 \
             WHERE id = $2 AND code = $3 AND used = FALSE \
               AND attempts < max_attempts AND expires_at >= $1",
        )
        .bind(now)
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to consume verification record".to_string(),
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn consume_by_token_hash(
        &self,
        id: &VerificationId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE verification_records \
             SET used = TRUE, used_at = $1 \
             WHERE id = $2 AND token_hash = $3 AND used = FALSE \
               AND attempts < max_attempts AND expires_at >= $1",
        )
        .bind(now)
        .bind(id)
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to consume verification record by token".to_string(),
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn supersede_pending(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE verification_records \
             SET used = TRUE, used_at = $1 \
             WHERE account_id = $2 AND purpose = $3 AND used = FALSE",
        )
        .bind(now)
        .bind(account_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: "Failed to supersede pending verification records".to_string(),
        })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_repo() -> SqlxVerificationRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!(
                "sqlite:file:{}?mode=memory&cache=shared",
                uuid::Uuid::new_v4()
            ))
            .await
            .expect("create sqlite pool");
        run_migrations(&pool).await.expect("run migrations");
        SqlxVerificationRepository::new(pool)
    }

    fn new_record(account_id: &AccountId, purpose: VerificationPurpose) -> NewVerificationRecord {
        let now = Utc::now();
        NewVerificationRecord {
            id: VerificationId::new(),
            account_id: account_id.clone(),
            purpose,
            code: "123456".to_string(),
            token_hash: "tokenhash".to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(15),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn latest_record_wins() {
        let repo = setup_repo().await;
        let account = AccountId::new();

        let mut first = new_record(&account, VerificationPurpose::Email);
        first.created_at = Utc::now() - Duration::minutes(5);
        repo.insert(first).await.unwrap();

        let second = repo.insert(new_record(&account, VerificationPurpose::Email)).await.unwrap();

        let latest =
            repo.find_latest(&account, VerificationPurpose::Email).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        // Purposes are independent
        assert!(repo
            .find_latest(&account, VerificationPurpose::TwoFactor)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn mismatch_counts_until_budget_exhausted() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let record = repo.insert(new_record(&account, VerificationPurpose::Sms)).await.unwrap();

        assert_eq!(repo.record_mismatch(&record.id).await.unwrap(), Some(1));
        assert_eq!(repo.record_mismatch(&record.id).await.unwrap(), Some(2));
        assert_eq!(repo.record_mismatch(&record.id).await.unwrap(), Some(3));
        // Budget spent: further guesses are not counted
        assert_eq!(repo.record_mismatch(&record.id).await.unwrap(), None);

        // Exhausted record cannot be consumed even with the right code
        assert!(!repo.consume(&record.id, "123456", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn consume_succeeds_exactly_once() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let record =
            repo.insert(new_record(&account, VerificationPurpose::TwoFactor)).await.unwrap();

        let now = Utc::now();
        assert!(!repo.consume(&record.id, "999999", now).await.unwrap(), "wrong code");
        assert!(repo.consume(&record.id, "123456", now).await.unwrap());
        assert!(!repo.consume(&record.id, "123456", now).await.unwrap(), "single use");

        let stored = repo.get(&record.id).await.unwrap().unwrap();
        assert!(stored.used);
        assert!(stored.used_at.is_some());
    }

    #[tokio::test]
    async fn consume_rejects_expired_record() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let mut payload = new_record(&account, VerificationPurpose::PasswordReset);
        payload.expires_at = Utc::now() - Duration::minutes(1);
        let record = repo.insert(payload).await.unwrap();

        assert!(!repo.consume(&record.id, "123456", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn consume_by_token_hash_matches_only_hash() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let record =
            repo.insert(new_record(&account, VerificationPurpose::PasswordReset)).await.unwrap();

        let now = Utc::now();
        assert!(!repo.consume_by_token_hash(&record.id, "otherhash", now).await.unwrap());
        assert!(repo.consume_by_token_hash(&record.id, "tokenhash", now).await.unwrap());
    }

    #[tokio::test]
    async fn supersede_marks_pending_only() {
        let repo = setup_repo().await;
        let account = AccountId::new();
        let first = repo.insert(new_record(&account, VerificationPurpose::Email)).await.unwrap();
        repo.consume(&first.id, "123456", Utc::now()).await.unwrap();

        let pending = repo.insert(new_record(&account, VerificationPurpose::Email)).await.unwrap();

        // Only the one pending record is superseded
        assert_eq!(
            repo.supersede_pending(&account, VerificationPurpose::Email, Utc::now())
                .await
                .unwrap(),
            1
        );
        let stored = repo.get(&pending.id).await.unwrap().unwrap();
        assert!(stored.used);
    }
}
