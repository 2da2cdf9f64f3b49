//! Sliding-window rate limiter behavior under the configured policies.

use std::time::Duration;

use ridegate::auth::{RateLimitPolicy, RateLimiter};
use ridegate::config::RateLimitConfig;

#[test]
fn eleventh_request_in_the_window_is_rejected() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy { window: Duration::from_millis(900_000), max_requests: 10 };

    for _ in 0..10 {
        assert!(limiter.allow("203.0.113.7:auth", policy).permitted);
    }

    let decision = limiter.allow("203.0.113.7:auth", policy);
    assert!(!decision.permitted);
    let retry_after = decision.retry_after.unwrap();
    assert!(retry_after > Duration::ZERO);
    assert!(retry_after <= Duration::from_millis(900_000));

    match decision.check().unwrap_err() {
        ridegate::Error::RateLimit { retry_after_ms, .. } => {
            assert!(retry_after_ms.unwrap() > 0);
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn counter_resets_once_the_window_elapses() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy { window: Duration::from_millis(80), max_requests: 3 };

    for _ in 0..3 {
        assert!(limiter.allow("client", policy).permitted);
    }
    assert!(!limiter.allow("client", policy).permitted);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let decision = limiter.allow("client", policy);
    assert!(decision.permitted);
    assert_eq!(decision.remaining, 2);
}

#[test]
fn refund_after_successful_login_frees_a_slot() {
    // The auth endpoint class counts only failed logins: callers refund
    // after a success is known
    let limiter = RateLimiter::new();
    let policy = RateLimitConfig::default().auth_policy();
    let key = "203.0.113.7:auth";

    for _ in 0..policy.max_requests {
        assert!(limiter.allow(key, policy).permitted);
    }
    assert!(!limiter.allow(key, policy).permitted);

    // Two refunds: one for the success, one for the rejected probe above
    limiter.refund(key);
    limiter.refund(key);
    assert!(limiter.allow(key, policy).permitted);
}

#[test]
fn endpoint_classes_have_independent_budgets() {
    let limiter = RateLimiter::new();
    let config = RateLimitConfig::default();

    let auth = config.auth_policy();
    let verification = config.verification_policy();
    assert!(auth.max_requests > verification.max_requests);

    for _ in 0..verification.max_requests {
        assert!(limiter.allow("203.0.113.7:verification", verification).permitted);
    }
    assert!(!limiter.allow("203.0.113.7:verification", verification).permitted);

    // The same client still has auth budget
    assert!(limiter.allow("203.0.113.7:auth", auth).permitted);
}

#[tokio::test]
async fn purge_bounds_memory_without_touching_live_windows() {
    let limiter = RateLimiter::new();
    let short = RateLimitPolicy { window: Duration::from_millis(30), max_requests: 5 };
    let long = RateLimitPolicy { window: Duration::from_millis(60_000), max_requests: 5 };

    for i in 0..16 {
        limiter.allow(&format!("burst-{i}"), short);
    }
    limiter.allow("steady", long);

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(limiter.purge_expired(), 16);
    // The live window kept its count across the purge
    assert_eq!(limiter.allow("steady", long).remaining, 3);
}
