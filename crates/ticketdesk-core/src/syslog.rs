//! Tiered audit logging with administrator alerting.
//!
//! # Design
//! - Priorities collapse into three tiers; the profile's log level decides what is kept,
//!   except while a schema upgrade is pending, when everything is kept.
//! - Alerts go out before the keep/drop decision.
//! - The alerting path records its own audit entry through `record` with
//!   `AlertMode::Suppress`, so an alert can never trigger another alert.
//! - Store and mail failures are reported through `tracing` and never propagate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketdesk_config::Configuration;
use ticketdesk_telemetry::{current_request_id, current_route};
use tracing::{debug, error, info, warn};

use crate::error::LogStoreResult;
use crate::mail::SharedMailer;
use crate::priority::{Priority, Severity};

/// Display name used when alerts go out through the bare system mailer.
pub const ALERT_SENDER_NAME: &str = "ticketdesk Alerts";

/// One persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation instant.
    pub created: DateTime<Utc>,
    /// Last update instant; equal to `created` for new entries.
    pub updated: DateTime<Utc>,
    /// Short summary.
    pub title: String,
    /// Persisted tier.
    pub severity: Severity,
    /// Full message body.
    pub message: String,
    /// Address of the client that triggered the entry.
    pub ip_address: String,
}

impl LogEntry {
    /// Build an entry stamped at `now`.
    #[must_use]
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        ip_address: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            created: now,
            updated: now,
            title: title.into(),
            severity,
            message: message.into(),
            ip_address: ip_address.into(),
        }
    }
}

/// Persistent destination for audit entries.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append an entry.
    async fn insert(&self, entry: &LogEntry) -> LogStoreResult<()>;
    /// Delete entries created more than `months` months ago, returning the count removed.
    async fn delete_older_than(&self, months: u32) -> LogStoreResult<u64>;
}

/// Shared reference to a log store.
pub type SharedLogStore = Arc<dyn LogStore>;

/// Whether a log call may notify the administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    /// Send an alert before deciding whether to persist.
    Notify,
    /// Never alert.
    Suppress,
}

impl From<bool> for AlertMode {
    fn from(alert: bool) -> Self {
        if alert { Self::Notify } else { Self::Suppress }
    }
}

/// Where the current request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Page or route being served; appended to alert bodies.
    pub page: String,
    /// Client address recorded with entries.
    pub remote_addr: String,
}

/// Collaborators the logger writes to.
#[derive(Clone)]
pub struct LogSinks {
    /// Entry destination.
    pub store: SharedLogStore,
    /// Alert transport.
    pub mailer: SharedMailer,
}

/// Request-scoped audit logger.
#[derive(Clone)]
pub struct Logger {
    config: Arc<Configuration>,
    sinks: LogSinks,
    origin: RequestOrigin,
    fallback_admin_email: String,
    upgrade_pending: bool,
}

impl Logger {
    /// Create a logger for one request.
    ///
    /// `fallback_admin_email` receives alerts when the profile names no administrator.
    #[must_use]
    pub fn new(
        config: Arc<Configuration>,
        sinks: LogSinks,
        origin: RequestOrigin,
        fallback_admin_email: impl Into<String>,
    ) -> Self {
        Self {
            config,
            sinks,
            origin,
            fallback_admin_email: fallback_admin_email.into(),
            upgrade_pending: false,
        }
    }

    /// Keep every entry regardless of level while a schema upgrade is pending.
    #[must_use]
    pub fn with_upgrade_pending(mut self, pending: bool) -> Self {
        self.upgrade_pending = pending;
        self
    }

    /// Origin recorded with entries.
    #[must_use]
    pub const fn origin(&self) -> &RequestOrigin {
        &self.origin
    }

    /// Log at `priority`, optionally alerting first. Returns whether the entry was stored.
    pub async fn log(&self, priority: Priority, title: &str, message: &str, alert: bool) -> bool {
        self.record(priority, title, message, AlertMode::from(alert))
            .await
    }

    /// Debug-tier entry.
    pub async fn log_debug(&self, title: &str, message: &str, alert: bool) -> bool {
        self.log(Priority::Debug, title, message, alert).await
    }

    /// Informational entry, persisted in the debug tier.
    pub async fn log_info(&self, title: &str, message: &str, alert: bool) -> bool {
        self.log(Priority::Info, title, message, alert).await
    }

    /// Warning-tier entry.
    pub async fn log_warning(&self, title: &str, message: &str, alert: bool) -> bool {
        self.log(Priority::Warning, title, message, alert).await
    }

    /// Error-tier entry.
    pub async fn log_error(&self, title: &str, message: &str, alert: bool) -> bool {
        self.log(Priority::Error, title, message, alert).await
    }

    /// Error-tier entry for a database failure; alerts only when the profile asks for it.
    pub async fn log_db_error(&self, title: &str, message: &str, alert: bool) -> bool {
        let alert = alert && self.config.alert_on_sql_error;
        self.log(Priority::Error, title, message, alert).await
    }

    /// Email the administrator. Returns whether the transport accepted the message.
    pub async fn alert(&self, subject: &str, body: &str) -> bool {
        let body = self.with_page(body);
        self.dispatch_alert(subject, &body).await
    }

    /// Email the administrator and, when `audit` is set, record the alert as a critical entry.
    pub async fn alert_admin(&self, subject: &str, body: &str, audit: bool) -> bool {
        let body = self.with_page(body);
        let sent = self.dispatch_alert(subject, &body).await;
        if audit {
            self.record(Priority::Critical, subject, &body, AlertMode::Suppress)
                .await;
        }
        sent
    }

    /// Delete entries older than the profile's retention window.
    ///
    /// Returns `false` without touching the store when no positive whole-month
    /// window is configured.
    pub async fn purge_logs(&self) -> bool {
        let Some(months) = self.config.log_grace_months() else {
            debug!(config_id = self.config.id, "log purge skipped: no retention window");
            return false;
        };

        match self.sinks.store.delete_older_than(months).await {
            Ok(removed) => {
                info!(config_id = self.config.id, months, removed, "purged expired log entries");
                true
            }
            Err(err) => {
                warn!(error = %err, operation = err.operation, "failed to purge log entries");
                false
            }
        }
    }

    async fn record(&self, priority: Priority, title: &str, message: &str, mode: AlertMode) -> bool {
        let severity = priority.severity();

        if mode == AlertMode::Notify {
            self.alert(title, message).await;
        }

        if !severity.is_within(self.config.log_level) && !self.upgrade_pending {
            return false;
        }

        let entry = LogEntry::new(
            severity,
            title,
            message,
            self.origin.remote_addr.as_str(),
            Utc::now(),
        );
        mirror(&entry);

        match self.sinks.store.insert(&entry).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, operation = err.operation, title, "failed to persist log entry");
                false
            }
        }
    }

    async fn dispatch_alert(&self, subject: &str, body: &str) -> bool {
        let to = self
            .config
            .admin_email()
            .unwrap_or(&self.fallback_admin_email)
            .to_string();

        let sender = self
            .config
            .alert_email
            .as_ref()
            .or(self.config.default_email.as_ref());

        let result = match sender {
            Some(account) => self.sinks.mailer.send(account, &to, subject, body).await,
            None => {
                let from_header = format!("\"{ALERT_SENDER_NAME}\" <{to}>");
                self.sinks
                    .mailer
                    .send_raw(&to, subject, body, &from_header)
                    .await
            }
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, operation = err.operation, subject, "failed to send admin alert");
                false
            }
        }
    }

    fn with_page(&self, body: &str) -> String {
        format!("{body}\n\n{}", self.origin.page)
    }
}

fn mirror(entry: &LogEntry) {
    let request_id = current_request_id();
    let route = current_route();
    match entry.severity {
        Severity::Error => error!(
            request_id = request_id.as_deref(),
            route = route.as_deref(),
            ip = %entry.ip_address,
            title = %entry.title,
            "{}",
            entry.message
        ),
        Severity::Warning => warn!(
            request_id = request_id.as_deref(),
            route = route.as_deref(),
            ip = %entry.ip_address,
            title = %entry.title,
            "{}",
            entry.message
        ),
        Severity::Debug => debug!(
            request_id = request_id.as_deref(),
            route = route.as_deref(),
            ip = %entry.ip_address,
            title = %entry.title,
            "{}",
            entry.message
        ),
    }
}
