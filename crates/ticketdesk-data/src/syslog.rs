//! System log entries stored in `ticketdesk_syslog`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use ticketdesk_core::{LogEntry, LogStore, LogStoreError, LogStoreResult, Severity};

use crate::error::{DataError, Result, map_query_err};

const INSERT_ENTRY: &str = r"
    INSERT INTO ticketdesk_syslog (log_type, title, log, ip_address, created, updated)
    VALUES ($1, $2, $3, $4, $5, $6)
";

const DELETE_EXPIRED: &str = r"
    DELETE FROM ticketdesk_syslog
    WHERE created + make_interval(months => $1) <= NOW()
";

const SELECT_RECENT: &str = r"
    SELECT log_type, title, log, ip_address, created, updated
    FROM ticketdesk_syslog
    ORDER BY created DESC, id DESC
    LIMIT $1
";

#[derive(Debug, FromRow)]
struct EntryRow {
    log_type: String,
    title: String,
    log: String,
    ip_address: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

/// Log backend writing `ticketdesk_syslog`.
#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error when the insert fails.
    pub async fn append(&self, entry: &LogEntry) -> Result<()> {
        sqlx::query(INSERT_ENTRY)
            .bind(entry.severity.as_str())
            .bind(&entry.title)
            .bind(&entry.message)
            .bind(&entry.ip_address)
            .bind(entry.created)
            .bind(entry.updated)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("insert_log"))?;
        Ok(())
    }

    /// Delete entries created at least `months` months ago.
    ///
    /// # Errors
    ///
    /// Returns an error when the delete fails.
    pub async fn purge(&self, months: u32) -> Result<u64> {
        let months = i32::try_from(months).unwrap_or(i32::MAX);
        let result = sqlx::query(DELETE_EXPIRED)
            .bind(months)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("purge_logs"))?;
        Ok(result.rows_affected())
    }

    /// Most recent entries, newest first.
    ///
    /// Rows with an unknown tier are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("list_logs"))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(LogEntry {
                    severity: Severity::from_name(&row.log_type)?,
                    created: row.created,
                    updated: row.updated,
                    title: row.title,
                    message: row.log,
                    ip_address: row.ip_address,
                })
            })
            .collect())
    }
}

fn store_error(operation: &'static str) -> impl FnOnce(DataError) -> LogStoreError {
    move |err| LogStoreError::new(operation, err)
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn insert(&self, entry: &LogEntry) -> LogStoreResult<()> {
        self.append(entry).await.map_err(store_error("insert"))
    }

    async fn delete_older_than(&self, months: u32) -> LogStoreResult<u64> {
        self.purge(months)
            .await
            .map_err(store_error("delete_older_than"))
    }
}
