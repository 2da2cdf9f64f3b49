//! Delivery channel collaborators for verification codes.
//!
//! Email and SMS transports live outside this crate; the engine only needs
//! fire-and-forget senders. Delivery failure never rolls back record
//! creation — the code stays valid and resend is the recovery path.

use async_trait::async_trait;
use tracing::info;

use crate::errors::Result;

/// Outbound email channel, keyed by template.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(
        &self,
        address: &str,
        template_id: &str,
        params: serde_json::Value,
    ) -> Result<()>;
}

/// Outbound SMS channel.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, phone_number: &str, message: &str) -> Result<()>;
}

/// Development sink that logs deliveries instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send_email(
        &self,
        address: &str,
        template_id: &str,
        params: serde_json::Value,
    ) -> Result<()> {
        info!(address, template_id, %params, "email delivery (log sink)");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for LogSender {
    async fn send_sms(&self, phone_number: &str, message: &str) -> Result<()> {
        info!(phone_number, message, "sms delivery (log sink)");
        Ok(())
    }
}
