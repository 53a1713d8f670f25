//! Persistent sessions stored in `ticketdesk_session`.
//!
//! Ephemeral sessions stay in process and are delegated to a
//! [`MemorySessionStore`], which expires and sweeps them on its own.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use ticketdesk_core::{
    DEFAULT_IDLE_TIMEOUT, MemorySessionStore, Session, SessionError, SessionId, SessionKind,
    SessionResult, SessionStore,
};
use tracing::debug;

use crate::error::{Result, map_query_err};

const SELECT_ACTIVE: &str = r"
    SELECT data, expires_at
    FROM ticketdesk_session
    WHERE id = $1 AND expires_at > NOW()
";

const UPSERT_SESSION: &str = r"
    INSERT INTO ticketdesk_session (id, data, expires_at, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (id) DO UPDATE
    SET data = EXCLUDED.data,
        expires_at = EXCLUDED.expires_at,
        updated_at = NOW()
";

const DELETE_EXPIRED: &str = r"DELETE FROM ticketdesk_session WHERE expires_at <= NOW()";

#[derive(Debug, FromRow)]
struct SessionRow {
    data: Json<Value>,
    expires_at: DateTime<Utc>,
}

/// Session backend keeping persistent sessions in PostgreSQL.
pub struct PgSessionStore {
    pool: PgPool,
    ephemeral: MemorySessionStore,
}

impl PgSessionStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_idle_timeout(pool, DEFAULT_IDLE_TIMEOUT)
    }

    /// Wrap an existing pool, letting ephemeral sessions lapse after `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(pool: PgPool, idle_timeout: Duration) -> Self {
        Self {
            pool,
            ephemeral: MemorySessionStore::with_idle_timeout(idle_timeout),
        }
    }

    /// Delete expired persistent sessions, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the delete fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(DELETE_EXPIRED)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("purge_sessions"))?;
        Ok(result.rows_affected())
    }

    async fn load_active(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(SELECT_ACTIVE)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("load_session"))
            .map_err(|err| SessionError::store("load", err))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let values: Map<String, Value> = serde_json::from_value(row.data.0)
            .map_err(|source| SessionError::Malformed { source })?;
        Ok(Some(Session::from_parts(
            id.clone(),
            SessionKind::Persistent,
            Some(row.expires_at),
            values,
        )))
    }

    async fn write(&self, session: &Session) -> SessionResult<()> {
        let expires_at = session.expires_at().unwrap_or(DateTime::<Utc>::MAX_UTC);
        sqlx::query(UPSERT_SESSION)
            .bind(session.id().as_str())
            .bind(Json(Value::Object(session.values().clone())))
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("save_session"))
            .map_err(|err| SessionError::store("save", err))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn start_persistent(
        &self,
        id: Option<&SessionId>,
        ttl: Duration,
    ) -> SessionResult<Session> {
        let now = Utc::now();
        let resumed = match id {
            Some(id) => self.load_active(id).await?,
            None => None,
        };
        let session = match resumed {
            Some(mut session) => {
                session.touch(ttl, now);
                session
            }
            None => {
                debug!(requested = id.is_some(), "issuing new persistent session");
                Session::persistent(SessionId::generate(), ttl, now)
            }
        };
        self.write(&session).await?;
        Ok(session)
    }

    async fn start_ephemeral(&self, id: Option<&SessionId>) -> SessionResult<Session> {
        self.ephemeral.start_ephemeral(id).await
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        match session.kind() {
            SessionKind::Persistent => self.write(session).await,
            SessionKind::Ephemeral => self.ephemeral.save(session).await,
        }
    }
}
