//! Outbound mail contract used for administrator alerts.

use std::sync::Arc;

use async_trait::async_trait;
use ticketdesk_config::EmailAccount;

use crate::error::MailResult;

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message through a configured sender account.
    async fn send(&self, from: &EmailAccount, to: &str, subject: &str, body: &str)
    -> MailResult<()>;

    /// Deliver a message through the bare system mailer with an explicit `From` header.
    async fn send_raw(&self, to: &str, subject: &str, body: &str, from_header: &str)
    -> MailResult<()>;
}

/// Shared reference to a mail transport.
pub type SharedMailer = Arc<dyn Mailer>;
