//! Verification code engine: single-use, expiring, attempt-limited codes
//! for email/SMS verification, password reset and two-factor challenges.
//!
//! Issuing never delivers; delivery runs through the channel collaborators
//! and its failure never rolls back the record. Each record walks one of
//! three terminal paths: consumed, exhausted, or expired. A fresh issue
//! always starts a new record and stale ones are simply ignored by the
//! most-recent lookup.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{rngs::OsRng, Rng, RngCore};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::delivery::{EmailSender, SmsSender};
use crate::auth::hashing::fingerprint;
use crate::auth::models::{IssuedVerification, NewVerificationRecord, VerificationPurpose};
use crate::config::VerificationConfig;
use crate::domain::{AccountId, VerificationId};
use crate::errors::{Error, Result, VerificationErrorType};
use crate::observability::metrics;
use crate::storage::repositories::{
    AuditEvent, AuditLogRepository, SqlxVerificationRepository, VerificationRepository,
};

/// Number of digits in a verification code
const CODE_LENGTH: u32 = 6;

/// Bytes of entropy behind the opaque verification token
const OPAQUE_TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct VerificationService {
    repository: Arc<dyn VerificationRepository>,
    audit_repository: Arc<AuditLogRepository>,
    config: VerificationConfig,
}

impl VerificationService {
    pub fn new(
        repository: Arc<dyn VerificationRepository>,
        audit_repository: Arc<AuditLogRepository>,
        config: VerificationConfig,
    ) -> Self {
        Self { repository, audit_repository, config }
    }

    pub fn with_sqlx(
        pool: crate::storage::DbPool,
        audit_repository: Arc<AuditLogRepository>,
        config: VerificationConfig,
    ) -> Self {
        Self::new(Arc::new(SqlxVerificationRepository::new(pool)), audit_repository, config)
    }

    /// Issue a fresh code and opaque token for the purpose. The caller owns
    /// delivery; both artifacts are returned exactly once and only the code
    /// plus a hash of the token persist.
    #[instrument(skip(self), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn issue(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
    ) -> Result<IssuedVerification> {
        let code = generate_code();
        let opaque_token = generate_opaque_token();
        let now = Utc::now();
        let expires_at = now + self.config.expiry_for(purpose);

        let record = self
            .repository
            .insert(NewVerificationRecord {
                id: VerificationId::new(),
                account_id: account_id.clone(),
                purpose,
                code: code.clone(),
                token_hash: fingerprint(&opaque_token),
                created_at: now,
                expires_at,
                max_attempts: self.config.max_attempts,
            })
            .await?;

        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.verification.issued",
                Some(record.id.as_str()),
                Some(account_id.as_str()),
                json!({ "purpose": purpose.as_str(), "expires_at": expires_at }),
            ))
            .await?;

        metrics::record_verification_issued(purpose.as_str()).await;
        info!(record_id = %record.id, purpose = %purpose, "verification code issued");

        Ok(IssuedVerification { record_id: record.id, code, opaque_token, expires_at })
    }

    /// Check a supplied code against the most recent record for the purpose.
    ///
    /// # Errors
    ///
    /// In check order: `NotFound`, `AlreadyUsed`, `Expired`,
    /// `AttemptsExhausted`, `Mismatch` (which burns one attempt).
    #[instrument(skip(self, supplied_code), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn verify(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
        supplied_code: &str,
    ) -> Result<()> {
        self.verify_inner(account_id, purpose, supplied_code, Comparison::Code).await
    }

    /// Check a supplied opaque token instead of the numeric code, with the
    /// same lifecycle rules. Used by link-based flows such as password reset.
    #[instrument(skip(self, supplied_token), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn verify_token(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
        supplied_token: &str,
    ) -> Result<()> {
        self.verify_inner(account_id, purpose, supplied_token, Comparison::OpaqueToken).await
    }

    /// Invalidate any pending code for the purpose and issue a new one, so
    /// an old code cannot stay valid after the user asked for another.
    /// Enforces the per-purpose resend cooldown.
    #[instrument(skip(self), fields(account_id = %account_id, purpose = %purpose))]
    pub async fn resend(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
    ) -> Result<IssuedVerification> {
        let now = Utc::now();

        if let Some(latest) = self.repository.find_latest(account_id, purpose).await? {
            let elapsed = now - latest.created_at;
            let cooldown = self.config.resend_cooldown();
            if !latest.used && elapsed < cooldown {
                let wait = cooldown - elapsed;
                return Err(Error::rate_limited(
                    "Verification code was just sent, wait before requesting another",
                    Some(wait.num_milliseconds().max(0) as u64),
                ));
            }
        }

        let superseded = self.repository.supersede_pending(account_id, purpose, now).await?;
        if superseded > 0 {
            info!(superseded, purpose = %purpose, "pending verification codes superseded by resend");
        }

        self.issue(account_id, purpose).await
    }

    /// Fire-and-forget email delivery. Failures are logged; the issued
    /// record stays valid and resend is the recovery path.
    pub async fn deliver_email(
        &self,
        sender: &dyn EmailSender,
        address: &str,
        template_id: &str,
        params: serde_json::Value,
    ) {
        if let Err(err) = sender.send_email(address, template_id, params).await {
            warn!(error = %err, address, "verification email delivery failed; code remains valid");
        }
    }

    /// Fire-and-forget SMS delivery, same failure policy as email.
    pub async fn deliver_sms(&self, sender: &dyn SmsSender, phone_number: &str, message: &str) {
        if let Err(err) = sender.send_sms(phone_number, message).await {
            warn!(error = %err, phone_number, "verification sms delivery failed; code remains valid");
        }
    }

    async fn verify_inner(
        &self,
        account_id: &AccountId,
        purpose: VerificationPurpose,
        supplied: &str,
        comparison: Comparison,
    ) -> Result<()> {
        let record = self
            .repository
            .find_latest(account_id, purpose)
            .await?
            .ok_or_else(|| {
                Error::verification("No verification code on file", VerificationErrorType::NotFound)
            })?;

        if record.used {
            return Err(Error::verification(
                "Verification code already used",
                VerificationErrorType::AlreadyUsed,
            ));
        }

        let now = Utc::now();
        if record.is_expired(now) {
            return Err(Error::verification(
                "Verification code has expired",
                VerificationErrorType::Expired,
            ));
        }

        if record.attempts_exhausted() {
            return Err(Error::verification(
                "Verification attempts exhausted",
                VerificationErrorType::AttemptsExhausted,
            ));
        }

        let (stored, supplied_value) = match comparison {
            Comparison::Code => (record.code.clone(), supplied.to_string()),
            Comparison::OpaqueToken => (record.token_hash.clone(), fingerprint(supplied)),
        };

        if stored != supplied_value {
            // The guarded increment refuses once a concurrent guess spent
            // the budget, so over-counting is impossible.
            return match self.repository.record_mismatch(&record.id).await? {
                Some(attempts) => {
                    warn!(
                        record_id = %record.id,
                        attempts,
                        max_attempts = record.max_attempts,
                        "verification code mismatch"
                    );
                    Err(Error::verification(
                        "Verification code does not match",
                        VerificationErrorType::Mismatch,
                    ))
                }
                None => Err(Error::verification(
                    "Verification attempts exhausted",
                    VerificationErrorType::AttemptsExhausted,
                )),
            };
        }

        let consumed = match comparison {
            Comparison::Code => self.repository.consume(&record.id, supplied, now).await?,
            Comparison::OpaqueToken => {
                self.repository.consume_by_token_hash(&record.id, &supplied_value, now).await?
            }
        };

        if !consumed {
            // Lost a race against another verify/resend for the same record
            return Err(Error::verification(
                "Verification code already used",
                VerificationErrorType::AlreadyUsed,
            ));
        }

        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.verification.consumed",
                Some(record.id.as_str()),
                Some(account_id.as_str()),
                json!({ "purpose": purpose.as_str() }),
            ))
            .await?;

        metrics::record_verification_consumed(purpose.as_str()).await;
        info!(record_id = %record.id, purpose = %purpose, "verification code consumed");

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Code,
    OpaqueToken,
}

/// Fixed-length random numeric code, zero-padded.
fn generate_code() -> String {
    let bound = 10u32.pow(CODE_LENGTH);
    format!("{:0width$}", OsRng.gen_range(0..bound), width = CODE_LENGTH as usize)
}

/// High-entropy opaque token, URL-safe for link-based flows.
fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
