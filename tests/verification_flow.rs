//! Verification code engine lifecycle across all four purposes.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::setup;
use ridegate::auth::{LogSender, VerificationPurpose, VerificationService};
use ridegate::config::VerificationConfig;
use ridegate::storage::{AuditLogRepository, SqlxVerificationRepository};
use ridegate::VerificationErrorType;
use serde_json::json;

#[tokio::test]
async fn code_verifies_exactly_once() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let issued =
        harness.verification.issue(&account, VerificationPurpose::Email).await.unwrap();
    assert_eq!(issued.code.len(), 6);

    harness.verification.verify(&account, VerificationPurpose::Email, &issued.code).await.unwrap();

    // Same code again: the record is spent
    let err = harness
        .verification
        .verify(&account, VerificationPurpose::Email, &issued.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::AlreadyUsed));
}

#[tokio::test]
async fn verify_without_a_record_is_not_found() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let err = harness
        .verification
        .verify(&account, VerificationPurpose::Sms, "123456")
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::NotFound));
}

#[tokio::test]
async fn purposes_never_cross_honor_codes() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let issued =
        harness.verification.issue(&account, VerificationPurpose::Email).await.unwrap();

    let err = harness
        .verification
        .verify(&account, VerificationPurpose::PasswordReset, &issued.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::NotFound));
}

#[tokio::test]
async fn expired_code_fails_regardless_of_remaining_attempts() {
    let harness = setup().await;
    let account = harness.register_account().await;

    // Two-factor codes carry the short five-minute expiry
    let issued =
        harness.verification.issue(&account, VerificationPurpose::TwoFactor).await.unwrap();
    let lifetime = issued.expires_at - Utc::now();
    assert!(lifetime <= chrono::Duration::minutes(5));

    // Simulate six minutes passing
    let past = Utc::now() - chrono::Duration::minutes(1);
    sqlx::query("UPDATE verification_records SET expires_at = $1 WHERE id = $2")
        .bind(past)
        .bind(issued.record_id.as_str())
        .execute(&harness.pool)
        .await
        .unwrap();

    let err = harness
        .verification
        .verify(&account, VerificationPurpose::TwoFactor, &issued.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::Expired));
}

#[tokio::test]
async fn three_mismatches_exhaust_the_record() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let issued =
        harness.verification.issue(&account, VerificationPurpose::Sms).await.unwrap();
    let wrong = if issued.code == "000000" { "000001" } else { "000000" };

    for _ in 0..3 {
        let err = harness
            .verification
            .verify(&account, VerificationPurpose::Sms, wrong)
            .await
            .unwrap_err();
        assert!(err.is_verification(VerificationErrorType::Mismatch));
    }

    // Budget spent: even the correct code is refused inside the expiry window
    let err = harness
        .verification
        .verify(&account, VerificationPurpose::Sms, &issued.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::AttemptsExhausted));
}

#[tokio::test]
async fn resend_supersedes_the_previous_code() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let old = harness.verification.issue(&account, VerificationPurpose::Email).await.unwrap();
    let fresh = harness.verification.resend(&account, VerificationPurpose::Email).await.unwrap();
    assert_ne!(old.record_id, fresh.record_id);

    // The new code works; afterwards the old one reports already-used (its
    // record was superseded, and the latest record is now spent too)
    harness
        .verification
        .verify(&account, VerificationPurpose::Email, &fresh.code)
        .await
        .unwrap();

    let err = harness
        .verification
        .verify(&account, VerificationPurpose::Email, &old.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::AlreadyUsed));
}

#[tokio::test]
async fn resend_cooldown_is_enforced() {
    let harness = setup().await;
    let account = harness.register_account().await;

    // Dedicated service with the default 60-second cooldown
    let service = VerificationService::new(
        Arc::new(SqlxVerificationRepository::new(harness.pool.clone())),
        Arc::new(AuditLogRepository::new(harness.pool.clone())),
        VerificationConfig::default(),
    );

    service.issue(&account, VerificationPurpose::Sms).await.unwrap();
    let err = service.resend(&account, VerificationPurpose::Sms).await.unwrap_err();
    match err {
        ridegate::Error::RateLimit { retry_after_ms, .. } => {
            assert!(retry_after_ms.unwrap() > 0);
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn opaque_token_flow_consumes_the_record() {
    let harness = setup().await;
    let account = harness.register_account().await;

    let issued = harness
        .verification
        .issue(&account, VerificationPurpose::PasswordReset)
        .await
        .unwrap();

    let err = harness
        .verification
        .verify_token(&account, VerificationPurpose::PasswordReset, "forged-token")
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::Mismatch));

    harness
        .verification
        .verify_token(&account, VerificationPurpose::PasswordReset, &issued.opaque_token)
        .await
        .unwrap();

    // Consumed via the token: the numeric code is dead too
    let err = harness
        .verification
        .verify(&account, VerificationPurpose::PasswordReset, &issued.code)
        .await
        .unwrap_err();
    assert!(err.is_verification(VerificationErrorType::AlreadyUsed));
}

#[tokio::test]
async fn delivery_failure_never_invalidates_the_record() {
    let harness = setup().await;
    let account = harness.register_account().await;

    struct FailingSender;

    #[async_trait::async_trait]
    impl ridegate::auth::EmailSender for FailingSender {
        async fn send_email(
            &self,
            _address: &str,
            _template_id: &str,
            _params: serde_json::Value,
        ) -> ridegate::Result<()> {
            Err(ridegate::Error::internal("smtp relay unreachable"))
        }
    }

    let issued =
        harness.verification.issue(&account, VerificationPurpose::Email).await.unwrap();

    harness
        .verification
        .deliver_email(
            &FailingSender,
            "rider@example.com",
            "verify_email",
            json!({ "code": issued.code }),
        )
        .await;

    // The code still verifies even though delivery failed
    harness.verification.verify(&account, VerificationPurpose::Email, &issued.code).await.unwrap();

    // The log sink path works as the development default
    let issued = harness.verification.issue(&account, VerificationPurpose::Sms).await.unwrap();
    harness
        .verification
        .deliver_sms(&LogSender, "+254700000001", &format!("Your code is {}", issued.code))
        .await;
}
