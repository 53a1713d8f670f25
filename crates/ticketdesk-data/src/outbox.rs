//! Outbound mail queued in `ticketdesk_mail_outbox`.
//!
//! The help desk never talks SMTP itself: alerts are written to the outbox and a
//! delivery agent drains pending rows, marking each one sent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use ticketdesk_config::EmailAccount;
use ticketdesk_core::{MailError, MailResult, Mailer};
use tracing::debug;

use crate::error::{Result, map_query_err};

const INSERT_MESSAGE: &str = r"
    INSERT INTO ticketdesk_mail_outbox (from_header, to_address, subject, body)
    VALUES ($1, $2, $3, $4)
    RETURNING id
";

const SELECT_PENDING: &str = r"
    SELECT id, from_header, to_address, subject, body, queued_at
    FROM ticketdesk_mail_outbox
    WHERE sent_at IS NULL
    ORDER BY id
    LIMIT $1
";

const MARK_SENT: &str = r"
    UPDATE ticketdesk_mail_outbox
    SET sent_at = NOW()
    WHERE id = $1 AND sent_at IS NULL
";

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct QueuedMail {
    /// Outbox row identifier.
    pub id: i64,
    /// Rendered `From` header.
    pub from_header: String,
    /// Recipient address.
    pub to_address: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// When the message was queued.
    pub queued_at: DateTime<Utc>,
}

/// Mail transport that queues messages in PostgreSQL.
#[derive(Clone)]
pub struct PgMailOutbox {
    pool: PgPool,
}

impl PgMailOutbox {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Queue a message, returning its outbox id.
    ///
    /// # Errors
    ///
    /// Returns an error when the insert fails.
    pub async fn enqueue(
        &self,
        from_header: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(INSERT_MESSAGE)
            .bind(from_header)
            .bind(to)
            .bind(subject)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_err("enqueue_mail"))?;
        debug!(outbox_id = id, to, "mail queued");
        Ok(id)
    }

    /// Oldest undelivered messages, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn pending(&self, limit: i64) -> Result<Vec<QueuedMail>> {
        sqlx::query_as::<_, QueuedMail>(SELECT_PENDING)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("list_pending_mail"))
    }

    /// Mark message `id` delivered. Returns `false` when it was already marked or
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the update fails.
    pub async fn mark_sent(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(MARK_SENT)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("mark_mail_sent"))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl Mailer for PgMailOutbox {
    async fn send(
        &self,
        from: &EmailAccount,
        to: &str,
        subject: &str,
        body: &str,
    ) -> MailResult<()> {
        self.enqueue(&from.mailbox(), to, subject, body)
            .await
            .map(|_| ())
            .map_err(|err| MailError::new("send", err))
    }

    async fn send_raw(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from_header: &str,
    ) -> MailResult<()> {
        self.enqueue(from_header, to, subject, body)
            .await
            .map(|_| ())
            .map_err(|err| MailError::new("send_raw", err))
    }
}
