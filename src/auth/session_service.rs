//! Session registry: persisted login records and their token lifecycle.
//!
//! Sessions are the authority over whether a token's claims are still
//! honored. A token that verifies cryptographically is still refused when
//! its session row has been revoked or has expired.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::auth::hashing::fingerprint;
use crate::auth::models::{
    AuthenticationResult, IssuedSession, NewSession, RefreshedAccess, Session,
};
use crate::auth::tokens::{TokenIssuer, ACCESS_TOKEN_CLASS, REFRESH_TOKEN_CLASS};
use crate::domain::{AccountId, Role, SessionId};
use crate::errors::{AuthErrorType, Error, Result};
use crate::observability::metrics;
use crate::storage::repositories::{
    AuditEvent, AuditLogRepository, SessionRepository, SqlxSessionRepository,
};

#[derive(Clone)]
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    audit_repository: Arc<AuditLogRepository>,
    tokens: TokenIssuer,
}

impl SessionService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        audit_repository: Arc<AuditLogRepository>,
        tokens: TokenIssuer,
    ) -> Self {
        Self { repository, audit_repository, tokens }
    }

    pub fn with_sqlx(
        pool: crate::storage::DbPool,
        audit_repository: Arc<AuditLogRepository>,
        tokens: TokenIssuer,
    ) -> Self {
        Self::new(Arc::new(SqlxSessionRepository::new(pool)), audit_repository, tokens)
    }

    /// Create one session row for a fresh login and hand both tokens back.
    /// Sibling sessions for the account stay untouched; concurrent devices
    /// are allowed up to an advisory maximum enforced upstream.
    #[instrument(skip(self, device, client_address), fields(account_id = %account_id))]
    pub async fn create_session(
        &self,
        account_id: &AccountId,
        role: Role,
        verified: bool,
        device: &str,
        client_address: &str,
    ) -> Result<IssuedSession> {
        let access_token = self.tokens.issue_access(account_id, role, verified)?;
        let (refresh_token, _correlator) = self.tokens.issue_refresh(account_id, role, verified)?;

        let now = Utc::now();
        let session_id = SessionId::new();
        let session = self
            .repository
            .insert_session(NewSession {
                id: session_id.clone(),
                account_id: account_id.clone(),
                role,
                verified,
                access_fp: fingerprint(&access_token),
                refresh_fp: fingerprint(&refresh_token),
                device: device.to_string(),
                client_address: client_address.to_string(),
                issued_at: now,
                access_expires_at: now + self.tokens.access_lifetime(),
                refresh_expires_at: now + self.tokens.refresh_lifetime(),
            })
            .await?;

        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.session.created",
                Some(session.id.as_str()),
                Some(account_id.as_str()),
                json!({
                    "device": device,
                    "client_address": client_address,
                    "access_expires_at": session.access_expires_at,
                    "refresh_expires_at": session.refresh_expires_at,
                }),
            ))
            .await?;

        metrics::record_session_created().await;
        info!(session_id = %session.id, account_id = %account_id, "session created");

        Ok(IssuedSession {
            session_id,
            access_token,
            refresh_token,
            access_expires_in: self.tokens.access_expires_in(),
            refresh_expires_in: self.tokens.refresh_expires_in(),
        })
    }

    /// Mint a new access token from a refresh token. The refresh token
    /// itself is not rotated; it stays valid until its own expiry or
    /// explicit invalidation.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedAccess> {
        let claims = self.tokens.verify(refresh_token)?;
        if claims.token_class != REFRESH_TOKEN_CLASS {
            return Err(Error::auth(
                "Token is not a refresh token",
                AuthErrorType::TokenInvalid,
            ));
        }

        let now = Utc::now();
        let session = self
            .repository
            .find_by_refresh_fp(&fingerprint(refresh_token))
            .await?
            .filter(|session| session.can_refresh(now))
            .ok_or_else(|| {
                Error::auth("Session is no longer eligible for refresh", AuthErrorType::SessionInvalid)
            })?;

        // Claims come from the session row, not the presented token; role or
        // verification changes since login propagate into the new token.
        let access_token =
            self.tokens.issue_access(&session.account_id, session.role, session.verified)?;

        self.repository
            .update_access(
                &session.id,
                fingerprint(&access_token),
                now + self.tokens.access_lifetime(),
                now,
            )
            .await?;

        metrics::record_token_refreshed().await;
        debug!(session_id = %session.id, "access token refreshed");

        Ok(RefreshedAccess {
            access_token,
            access_expires_in: self.tokens.access_expires_in(),
        })
    }

    /// Authorize a request from its access token, returning the identity the
    /// HTTP layer needs for downstream decisions.
    #[instrument(skip(self, access_token))]
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthenticationResult> {
        if access_token.trim().is_empty() {
            return Err(Error::auth("Authentication token missing", AuthErrorType::MissingToken));
        }

        let claims = self.tokens.verify(access_token)?;
        if claims.token_class != ACCESS_TOKEN_CLASS {
            return Err(Error::auth(
                "Token is not an access token",
                AuthErrorType::TokenInvalid,
            ));
        }

        let now = Utc::now();
        let session = self
            .repository
            .find_by_access_fp(&fingerprint(access_token))
            .await?
            .filter(|session| session.can_authorize(now))
            .ok_or_else(|| {
                // The token still verifies but session state is authoritative
                Error::auth("Session revoked or expired", AuthErrorType::SessionInvalid)
            })?;

        self.repository.touch_activity(&session.id, now).await?;

        Ok(AuthenticationResult {
            account_id: session.account_id,
            role: session.role,
            verified: session.verified,
            session_id: session.id,
        })
    }

    /// Deactivate the session matching either token. Idempotent: a token
    /// whose session is already inactive reports success, since "already
    /// invalid" is the requested outcome.
    #[instrument(skip(self, token))]
    pub async fn invalidate_session(&self, token: &str) -> Result<bool> {
        let affected = self.repository.deactivate_by_fp(&fingerprint(token)).await?;

        if affected > 0 {
            self.audit_repository
                .record_auth_event(AuditEvent::auth(
                    "auth.session.invalidated",
                    None,
                    None,
                    json!({ "sessions": affected }),
                ))
                .await?;
            metrics::record_session_invalidated(affected).await;
            info!(sessions = affected, "session invalidated");
        }

        Ok(true)
    }

    /// Deactivate every active session of an account. Exposed for password
    /// change and compromise response triggers from outside the core.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn invalidate_all(&self, account_id: &AccountId) -> Result<u64> {
        let affected = self.repository.deactivate_all(account_id).await?;

        if affected > 0 {
            self.audit_repository
                .record_auth_event(AuditEvent::auth(
                    "auth.session.invalidated",
                    Some(account_id.as_str()),
                    None,
                    json!({ "sessions": affected, "scope": "account" }),
                ))
                .await?;
            metrics::record_session_invalidated(affected).await;
            warn!(account_id = %account_id, sessions = affected, "all sessions invalidated");
        }

        Ok(affected)
    }

    /// Sweep sessions whose access and refresh windows have both passed.
    /// Intended for a periodic external trigger, not the request path.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let affected = self.repository.deactivate_expired(Utc::now()).await?;

        if affected > 0 {
            self.audit_repository
                .record_auth_event(AuditEvent::auth(
                    "auth.session.purged",
                    None,
                    None,
                    json!({ "sessions": affected }),
                ))
                .await?;
            info!(sessions = affected, "expired sessions deactivated");
        }

        Ok(affected)
    }

    /// Active session count for an account, for advisory limits upstream.
    pub async fn active_session_count(&self, account_id: &AccountId) -> Result<i64> {
        self.repository.count_active_for_account(account_id).await
    }

    /// Look up a session row directly, mainly for administrative tooling.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        self.repository.get_session(id).await
    }
}
