//! Login orchestration for password authentication.
//!
//! Owns the order the pieces must run in: lockout gate before password
//! verification, exactly one governor call after it, session issue only on
//! success. Unknown account and wrong password both collapse to
//! `InvalidCredentials`; lockout is disclosed explicitly so users know to
//! wait.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::credentials::CredentialStore;
use crate::auth::lockout::LoginAttemptGovernor;
use crate::auth::models::{
    AuthenticationResult, Credential, LoginOutcome, LoginRequest, NewCredential,
};
use crate::auth::session_service::SessionService;
use crate::domain::AccountId;
use crate::errors::{AuthErrorType, Error, Result};
use crate::observability::metrics;
use crate::storage::repositories::{AuditEvent, AuditLogRepository, CredentialRepository};

#[derive(Clone)]
pub struct LoginService {
    credential_repository: Arc<dyn CredentialRepository>,
    credential_store: CredentialStore,
    governor: LoginAttemptGovernor,
    session_service: SessionService,
    audit_repository: Arc<AuditLogRepository>,
}

impl LoginService {
    pub fn new(
        credential_repository: Arc<dyn CredentialRepository>,
        credential_store: CredentialStore,
        governor: LoginAttemptGovernor,
        session_service: SessionService,
        audit_repository: Arc<AuditLogRepository>,
    ) -> Self {
        Self { credential_repository, credential_store, governor, session_service, audit_repository }
    }

    /// Store a credential for a new account.
    #[instrument(skip(self, password), fields(account_id = %account_id))]
    pub async fn register_credential(
        &self,
        account_id: &AccountId,
        password: &str,
    ) -> Result<Credential> {
        let password_hash = self.credential_store.hash(password)?;
        self.credential_repository
            .create_credential(NewCredential { account_id: account_id.clone(), password_hash })
            .await
    }

    /// Authenticate with account id and password, returning the session
    /// tokens and the identity context for the HTTP layer.
    ///
    /// # Errors
    ///
    /// - `AccountLocked` when the lockout window is in effect
    /// - `InvalidCredentials` for unknown account or wrong password
    #[instrument(skip(self, request), fields(account_id = %request.account_id))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome> {
        request.validate().map_err(Error::from)?;
        let account_id = AccountId::from_str_unchecked(&request.account_id);

        // Lockout is checked before touching the password so a locked
        // account cannot probe hashes.
        if self.governor.is_locked(&account_id).await? {
            warn!(account_id = %account_id, "login attempt against locked account");
            metrics::record_authentication("account_locked").await;
            self.audit_failure(&account_id, &request.client_address, "account_locked").await?;
            return Err(Error::auth(
                "Account temporarily locked, try again later",
                AuthErrorType::AccountLocked,
            ));
        }

        let credential = match self.credential_repository.find_by_account(&account_id).await? {
            Some(credential) => credential,
            None => {
                // Prevent timing-based account enumeration: burn the same
                // verification time as a real credential check.
                self.credential_store.equalize_timing(&request.password);
                warn!(account_id = %account_id, "login attempt for unknown account");
                metrics::record_authentication("invalid_credentials").await;
                return Err(Error::auth(
                    "Invalid account or password",
                    AuthErrorType::InvalidCredentials,
                ));
            }
        };

        let password_matches =
            self.credential_store.verify(&request.password, &credential.password_hash);

        if !password_matches {
            self.governor.record_failure(&account_id).await?;
            warn!(account_id = %account_id, "login attempt with incorrect password");
            metrics::record_authentication("invalid_credentials").await;
            self.audit_failure(&account_id, &request.client_address, "invalid_password").await?;
            return Err(Error::auth(
                "Invalid account or password",
                AuthErrorType::InvalidCredentials,
            ));
        }

        self.governor.record_success(&account_id).await?;

        let session = self
            .session_service
            .create_session(
                &account_id,
                request.role,
                request.verified,
                &request.device,
                &request.client_address,
            )
            .await?;

        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.login.success",
                Some(account_id.as_str()),
                None,
                json!({
                    "session_id": session.session_id,
                    "client_address": request.client_address,
                    "device": request.device,
                }),
            ))
            .await?;

        metrics::record_authentication("success").await;
        info!(account_id = %account_id, session_id = %session.session_id, "login succeeded");

        let auth = AuthenticationResult {
            account_id,
            role: request.role,
            verified: request.verified,
            session_id: session.session_id.clone(),
        };

        Ok(LoginOutcome { auth, session })
    }

    /// Change an account's password after re-verifying the current one, then
    /// invalidate every session as the compromise response.
    #[instrument(skip(self, current_password, new_password), fields(account_id = %account_id))]
    pub async fn change_password(
        &self,
        account_id: &AccountId,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let credential = self
            .credential_repository
            .find_by_account(account_id)
            .await?
            .ok_or_else(|| {
                Error::auth("Invalid account or password", AuthErrorType::InvalidCredentials)
            })?;

        if !self.credential_store.verify(current_password, &credential.password_hash) {
            warn!(account_id = %account_id, "password change with incorrect current password");
            return Err(Error::auth(
                "Invalid account or password",
                AuthErrorType::InvalidCredentials,
            ));
        }

        let new_hash = self.credential_store.hash(new_password)?;
        self.credential_repository.update_password_hash(account_id, new_hash).await?;
        self.credential_repository.reset_failures(account_id).await?;

        let invalidated = self.session_service.invalidate_all(account_id).await?;

        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.password.changed",
                Some(account_id.as_str()),
                None,
                json!({ "sessions_invalidated": invalidated }),
            ))
            .await?;

        info!(account_id = %account_id, invalidated, "password changed, sessions invalidated");
        Ok(())
    }

    async fn audit_failure(
        &self,
        account_id: &AccountId,
        client_address: &str,
        reason: &str,
    ) -> Result<()> {
        self.audit_repository
            .record_auth_event(AuditEvent::auth(
                "auth.login.failed",
                Some(account_id.as_str()),
                None,
                json!({ "reason": reason, "client_address": client_address }),
            ))
            .await
    }
}
