//! Focused repository modules for the authentication core's persisted state.

pub mod audit_log;
pub mod credential;
pub mod session;
pub mod verification;

pub use audit_log::{AuditEvent, AuditLogRepository};
pub use credential::{CredentialRepository, SqlxCredentialRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use verification::{SqlxVerificationRepository, VerificationRepository};
