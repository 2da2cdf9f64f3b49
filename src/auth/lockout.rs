//! Failed-login governor: consecutive-failure counting and timed lockout.
//!
//! State machine per account: failures accumulate until the threshold, the
//! account locks for the configured window, and any successful
//! authentication resets both counter and lock. The counter update is a
//! single conditional statement in the repository, so concurrent failures
//! cannot under-count past the threshold.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::auth::models::LockoutState;
use crate::config::LockoutConfig;
use crate::domain::AccountId;
use crate::errors::Result;
use crate::observability::metrics;
use crate::storage::repositories::{
    AuditEvent, AuditLogRepository, CredentialRepository, SqlxCredentialRepository,
};

#[derive(Clone)]
pub struct LoginAttemptGovernor {
    repository: Arc<dyn CredentialRepository>,
    audit_repository: Arc<AuditLogRepository>,
    config: LockoutConfig,
}

impl LoginAttemptGovernor {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        audit_repository: Arc<AuditLogRepository>,
        config: LockoutConfig,
    ) -> Self {
        Self { repository, audit_repository, config }
    }

    pub fn with_sqlx(
        pool: crate::storage::DbPool,
        audit_repository: Arc<AuditLogRepository>,
        config: LockoutConfig,
    ) -> Self {
        Self::new(Arc::new(SqlxCredentialRepository::new(pool)), audit_repository, config)
    }

    /// Whether the account is currently locked out. Accounts without a
    /// credential row are never locked.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn is_locked(&self, account_id: &AccountId) -> Result<bool> {
        let credential = self.repository.find_by_account(account_id).await?;
        Ok(credential.map(|c| c.is_locked(Utc::now())).unwrap_or(false))
    }

    /// Count one failed login. Crossing the threshold locks the account for
    /// the configured duration and emits an audit event.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn record_failure(&self, account_id: &AccountId) -> Result<Option<LockoutState>> {
        let locked_until = Utc::now() + self.config.lockout_duration();
        let state = self
            .repository
            .record_failure(account_id, self.config.max_login_attempts, locked_until)
            .await?;

        if let Some(state) = state {
            if state.failed_attempts == self.config.max_login_attempts {
                warn!(
                    account_id = %account_id,
                    failed_attempts = state.failed_attempts,
                    locked_until = ?state.locked_until,
                    "account locked after consecutive login failures"
                );
                self.audit_repository
                    .record_auth_event(AuditEvent::auth(
                        "auth.account.locked",
                        Some(account_id.as_str()),
                        None,
                        json!({
                            "failed_attempts": state.failed_attempts,
                            "locked_until": state.locked_until,
                        }),
                    ))
                    .await?;
                metrics::record_account_locked().await;
            }
        }

        Ok(state)
    }

    /// Reset the failure counter and clear any lockout unconditionally.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn record_success(&self, account_id: &AccountId) -> Result<()> {
        self.repository.reset_failures(account_id).await?;
        debug!(account_id = %account_id, "failure counter reset after successful authentication");
        Ok(())
    }
}
