//! # Metrics Collection
//!
//! Prometheus metrics for the authentication core. Services call the free
//! `record_*` functions, which are no-ops until `init_metrics` installs the
//! global recorder — unit tests and embedders without metrics pay nothing.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::sync::RwLock;

static METRICS: RwLock<Option<MetricsRecorder>> = RwLock::const_new(None);

/// Metrics recorder that tracks authentication activity
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record authentication attempt outcome
    pub fn record_authentication(&self, status: &str) {
        counter!("auth_authentications_total").increment(1);
        let labels = [("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    /// Record an account lockout event
    pub fn record_account_locked(&self) {
        counter!("auth_account_lockouts_total").increment(1);
    }

    /// Record session creation
    pub fn record_session_created(&self) {
        counter!("auth_sessions_created_total").increment(1);
    }

    /// Record session invalidation
    pub fn record_session_invalidated(&self, count: u64) {
        counter!("auth_sessions_invalidated_total").increment(count);
    }

    /// Record an access token refresh
    pub fn record_token_refreshed(&self) {
        counter!("auth_tokens_refreshed_total").increment(1);
    }

    /// Record verification code issuance
    pub fn record_verification_issued(&self, purpose: &str) {
        let labels = [("purpose", purpose.to_string())];
        counter!("auth_verifications_issued_total", &labels).increment(1);
    }

    /// Record verification code consumption
    pub fn record_verification_consumed(&self, purpose: &str) {
        let labels = [("purpose", purpose.to_string())];
        counter!("auth_verifications_consumed_total", &labels).increment(1);
    }

    /// Record a rate-limited request
    pub fn record_rate_limited(&self, endpoint_class: &str) {
        let labels = [("class", endpoint_class.to_string())];
        counter!("auth_rate_limited_total", &labels).increment(1);
    }

    /// Update gauge tracking active sessions
    pub fn set_active_sessions(&self, count: usize) {
        gauge!("auth_sessions_active").set(count as f64);
    }
}

/// Install the Prometheus exporter and the global recorder
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|e| Error::validation(format!("Invalid metrics address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus exporter: {}", e)))?;

    describe_counter!(
        "auth_authentications_total",
        Unit::Count,
        "Login attempts by outcome status"
    );
    describe_counter!(
        "auth_account_lockouts_total",
        Unit::Count,
        "Accounts locked after consecutive login failures"
    );
    describe_counter!("auth_sessions_created_total", Unit::Count, "Sessions created on login");
    describe_counter!(
        "auth_sessions_invalidated_total",
        Unit::Count,
        "Sessions deactivated by logout or revocation"
    );
    describe_counter!(
        "auth_tokens_refreshed_total",
        Unit::Count,
        "Access tokens minted from refresh tokens"
    );
    describe_counter!(
        "auth_verifications_issued_total",
        Unit::Count,
        "Verification codes issued by purpose"
    );
    describe_counter!(
        "auth_verifications_consumed_total",
        Unit::Count,
        "Verification codes consumed by purpose"
    );
    describe_counter!(
        "auth_rate_limited_total",
        Unit::Count,
        "Requests rejected by the rate limiter"
    );
    describe_gauge!("auth_sessions_active", Unit::Count, "Currently active sessions");

    *METRICS.write().await = Some(MetricsRecorder::new());
    info!(metrics_address = %addr, "Prometheus metrics exporter installed");

    Ok(())
}

async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

/// Record an authentication attempt outcome via the global recorder
pub async fn record_authentication(status: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_authentication(status);
    }
}

/// Record an account lockout via the global recorder
pub async fn record_account_locked() {
    if let Some(metrics) = get_metrics().await {
        metrics.record_account_locked();
    }
}

/// Record session creation via the global recorder
pub async fn record_session_created() {
    if let Some(metrics) = get_metrics().await {
        metrics.record_session_created();
    }
}

/// Record session invalidation via the global recorder
pub async fn record_session_invalidated(count: u64) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_session_invalidated(count);
    }
}

/// Record an access token refresh via the global recorder
pub async fn record_token_refreshed() {
    if let Some(metrics) = get_metrics().await {
        metrics.record_token_refreshed();
    }
}

/// Record verification code issuance via the global recorder
pub async fn record_verification_issued(purpose: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_verification_issued(purpose);
    }
}

/// Record verification code consumption via the global recorder
pub async fn record_verification_consumed(purpose: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_verification_consumed(purpose);
    }
}

/// Record a rate-limited request via the global recorder
pub async fn record_rate_limited(endpoint_class: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_rate_limited(endpoint_class);
    }
}

/// Update the active session gauge via the global recorder
pub async fn set_active_sessions(count: usize) {
    if let Some(metrics) = get_metrics().await {
        metrics.set_active_sessions(count);
    }
}
