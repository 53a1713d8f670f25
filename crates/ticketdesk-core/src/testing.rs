//! Shared fakes for unit tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ticketdesk_config::{Configuration, EmailAccount};

use crate::error::{LogStoreError, LogStoreResult, MailError, MailResult};
use crate::mail::Mailer;
use crate::syslog::{LogEntry, LogStore};

pub(crate) fn sample_config() -> Configuration {
    Configuration {
        id: 1,
        schema_version: Some(3),
        schema_signature: "b4a8f2".to_string(),
        helpdesk_online: true,
        admin_email: Some("admin@example.com".to_string()),
        alert_email: None,
        default_email: None,
        allowed_file_types: Some(".pdf, .png, .jpeg".to_string()),
        max_file_size: 1_048_576,
        log_level: 2,
        log_grace_period: Some("6".to_string()),
        alert_on_sql_error: true,
        tz_offset: -5.0,
        observe_dst: true,
    }
}

pub(crate) fn account(id: u32, address: &str) -> EmailAccount {
    EmailAccount {
        id,
        address: address.to_string(),
        name: None,
    }
}

#[derive(Default)]
pub(crate) struct RecordingLogStore {
    pub(crate) entries: Mutex<Vec<LogEntry>>,
    pub(crate) purges: Mutex<Vec<u32>>,
    pub(crate) fail: bool,
}

impl RecordingLogStore {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn purges(&self) -> Vec<u32> {
        self.purges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LogStore for RecordingLogStore {
    async fn insert(&self, entry: &LogEntry) -> LogStoreResult<()> {
        if self.fail {
            return Err(LogStoreError::new(
                "insert",
                std::io::Error::other("log table locked"),
            ));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    async fn delete_older_than(&self, months: u32) -> LogStoreResult<u64> {
        self.purges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(months);
        Ok(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMail {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) raw: bool,
}

#[derive(Default)]
pub(crate) struct RecordingMailer {
    pub(crate) sent: Mutex<Vec<SentMail>>,
    pub(crate) fail: bool,
}

impl RecordingMailer {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, mail: SentMail) -> MailResult<()> {
        if self.fail {
            return Err(MailError::new("send", std::io::Error::other("relay refused")));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail);
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        from: &EmailAccount,
        to: &str,
        subject: &str,
        body: &str,
    ) -> MailResult<()> {
        self.record(SentMail {
            from: from.mailbox(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            raw: false,
        })
    }

    async fn send_raw(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from_header: &str,
    ) -> MailResult<()> {
        self.record(SentMail {
            from: from_header.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            raw: true,
        })
    }
}

pub(crate) struct Fakes {
    pub(crate) logs: Arc<RecordingLogStore>,
    pub(crate) mailer: Arc<RecordingMailer>,
}

impl Fakes {
    pub(crate) fn new() -> Self {
        Self {
            logs: Arc::new(RecordingLogStore::default()),
            mailer: Arc::new(RecordingMailer::default()),
        }
    }
}
