//! Session model, storage contract, and the per-request bootstrap.
//!
//! # Design
//! - Legacy-schema profiles get persistent, store-backed sessions with a TTL; current
//!   profiles get ephemeral in-process sessions that lapse after an idle timeout.
//! - Unknown or expired identifiers are never adopted; a fresh identifier is issued.
//! - Timezone defaults are copied from the profile on every bootstrap so a later login
//!   within the request can override them.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ticketdesk_config::Configuration;
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionResult;

/// Session key holding the default timezone offset in hours.
pub const SESSION_TZ_OFFSET: &str = "TZ_OFFSET";
/// Session key holding the default daylight-saving flag.
pub const SESSION_TZ_DST: &str = "TZ_DST";
/// Lifetime granted to persistent sessions unless overridden.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Idle time after which an in-process ephemeral session lapses.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Minimum spacing, in seconds, between opportunistic sweeps of the in-process store.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for SessionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Storage class of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Store-backed with an expiry.
    Persistent,
    /// In-process, lapsing after an idle timeout.
    Ephemeral,
}

impl SessionKind {
    /// Lowercase label used in logs and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

/// Session state for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    kind: SessionKind,
    expires_at: Option<DateTime<Utc>>,
    values: Map<String, Value>,
}

impl Session {
    /// Create an ephemeral session. It has no expiry until a store touches it.
    #[must_use]
    pub fn ephemeral(id: SessionId) -> Self {
        Self {
            id,
            kind: SessionKind::Ephemeral,
            expires_at: None,
            values: Map::new(),
        }
    }

    /// Create a persistent session expiring `ttl` after `now`.
    #[must_use]
    pub fn persistent(id: SessionId, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: SessionKind::Persistent,
            expires_at: Some(expiry_after(now, ttl)),
            values: Map::new(),
        }
    }

    /// Rebuild a session from stored parts.
    #[must_use]
    pub const fn from_parts(
        id: SessionId,
        kind: SessionKind,
        expires_at: Option<DateTime<Utc>>,
        values: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            kind,
            expires_at,
            values,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Storage class.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Expiry instant, if one has been assigned.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// All stored values.
    #[must_use]
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Whether the session is still usable at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Push the expiry to `ttl` after `now`.
    pub fn touch(&mut self, ttl: Duration, now: DateTime<Utc>) {
        self.expires_at = Some(expiry_after(now, ttl));
    }

    /// Stored value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Stored string value for `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Remove and return the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Timezone offset in hours, when set.
    #[must_use]
    pub fn tz_offset(&self) -> Option<f64> {
        self.values.get(SESSION_TZ_OFFSET).and_then(Value::as_f64)
    }

    /// Daylight-saving flag, when set.
    #[must_use]
    pub fn observes_dst(&self) -> Option<bool> {
        self.values.get(SESSION_TZ_DST).and_then(Value::as_bool)
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Backend that creates, resumes and saves sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resume the active persistent session `id`, or start a new one living `ttl`.
    async fn start_persistent(&self, id: Option<&SessionId>, ttl: Duration)
    -> SessionResult<Session>;
    /// Resume the ephemeral session `id`, or start a new one.
    async fn start_ephemeral(&self, id: Option<&SessionId>) -> SessionResult<Session>;
    /// Write the session back to the store.
    async fn save(&self, session: &Session) -> SessionResult<()>;
}

/// Shared reference to a session backend.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// In-process session store.
///
/// Serves ephemeral sessions in production and both kinds in tests. Ephemeral
/// sessions expire `idle_timeout` after their last start or save, and expired
/// entries are swept at most once per minute when sessions are started.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    idle_timeout: Duration,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemorySessionStore {
    /// Create an empty store using [`DEFAULT_IDLE_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose ephemeral sessions lapse after `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            last_sweep: Mutex::new(None),
        }
    }

    /// Number of sessions currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every session that expired before `now`, returning how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.is_active(now));
        before - sessions.len()
    }

    fn sweep_if_due(&self, now: DateTime<Utc>) {
        {
            let mut last_sweep = self
                .last_sweep
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let recent = last_sweep.is_some_and(|last| {
                now.signed_duration_since(last).num_seconds() < SWEEP_INTERVAL_SECS
            });
            if recent {
                return;
            }
            *last_sweep = Some(now);
        }
        let purged = self.purge_expired(now);
        if purged > 0 {
            debug!(purged, "swept expired sessions");
        }
    }

    fn resume(
        &self,
        id: Option<&SessionId>,
        kind: SessionKind,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let id = id?;
        self.lock()
            .get(id)
            .filter(|session| session.kind == kind && session.is_active(now))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn start_persistent(
        &self,
        id: Option<&SessionId>,
        ttl: Duration,
    ) -> SessionResult<Session> {
        let now = Utc::now();
        self.sweep_if_due(now);
        let session = match self.resume(id, SessionKind::Persistent, now) {
            Some(mut session) => {
                session.touch(ttl, now);
                session
            }
            None => Session::persistent(SessionId::generate(), ttl, now),
        };
        self.lock().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn start_ephemeral(&self, id: Option<&SessionId>) -> SessionResult<Session> {
        let now = Utc::now();
        self.sweep_if_due(now);
        let mut session = self
            .resume(id, SessionKind::Ephemeral, now)
            .unwrap_or_else(|| Session::ephemeral(SessionId::generate()));
        session.touch(self.idle_timeout, now);
        self.lock().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        let mut stored = session.clone();
        if stored.kind == SessionKind::Ephemeral {
            stored.touch(self.idle_timeout, Utc::now());
        }
        self.lock().insert(stored.id.clone(), stored);
        Ok(())
    }
}

/// Starts the session appropriate for a configuration profile.
#[derive(Clone)]
pub struct SessionBootstrap {
    store: SharedSessionStore,
    ttl: Duration,
}

impl SessionBootstrap {
    /// Bootstrap sessions from `store`, granting persistent sessions `ttl`.
    #[must_use]
    pub fn new(store: SharedSessionStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Start or resume the session for `config` and seed its timezone defaults.
    ///
    /// # Errors
    ///
    /// Propagates any failure raised by the session store.
    pub async fn start(
        &self,
        config: &Configuration,
        id: Option<&SessionId>,
    ) -> SessionResult<Session> {
        let mut session = if config.is_legacy_schema() {
            self.store.start_persistent(id, self.ttl).await?
        } else {
            self.store.start_ephemeral(id).await?
        };

        session.insert(SESSION_TZ_OFFSET, f64::from(config.tz_offset));
        session.insert(SESSION_TZ_DST, config.observe_dst);
        debug!(
            session_kind = session.kind().as_str(),
            resumed = id.is_some_and(|requested| requested == session.id()),
            "session started"
        );
        Ok(session)
    }

    /// Persist session changes made during the request.
    ///
    /// # Errors
    ///
    /// Propagates any failure raised by the session store.
    pub async fn commit(&self, session: &Session) -> SessionResult<()> {
        self.store.save(session).await
    }
}
