//! Environment settings and service wiring for the host binary.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ticketdesk_api::{ApiServer, ApiState};
use ticketdesk_config::ConfigId;
use ticketdesk_core::{
    BootstrapOptions, Collaborators, DEFAULT_ADMIN_EMAIL, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_SESSION_TTL,
};
use ticketdesk_data::{
    PgConfigStore, PgLogStore, PgMailOutbox, PgSessionStore, apply_migrations, connect,
};
use ticketdesk_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_CONFIG_ID: ConfigId = 1;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Process settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    /// PostgreSQL connection string (`DATABASE_URL`).
    pub database_url: String,
    /// Profile served by this process (`TICKETDESK_CONFIG_ID`, default 1).
    pub config_id: ConfigId,
    /// Listener address (`TICKETDESK_BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Pool size (`TICKETDESK_DB_MAX_CONNECTIONS`).
    pub max_connections: u32,
    /// Default log filter when `RUST_LOG` is unset (`TICKETDESK_LOG_LEVEL`).
    pub log_level: String,
    /// Log output format (`TICKETDESK_LOG_FORMAT`: `json` or `pretty`).
    pub log_format: LogFormat,
    /// Persistent session lifetime (`TICKETDESK_SESSION_TTL_SECS`).
    pub session_ttl: Duration,
    /// Ephemeral session idle timeout (`TICKETDESK_SESSION_IDLE_SECS`).
    pub idle_timeout: Duration,
    /// Schema signature this build expects (`TICKETDESK_SCHEMA_SIGNATURE`).
    pub expected_schema_signature: Option<String>,
    /// Fallback alert recipient (`TICKETDESK_ADMIN_EMAIL`).
    pub system_admin_email: String,
}

impl AppSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `DATABASE_URL` is missing or a value does not parse.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error when `DATABASE_URL` is missing or a value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = var("DATABASE_URL").ok_or(AppError::MissingEnv {
            name: "DATABASE_URL",
        })?;
        let config_id = parse_var(
            "TICKETDESK_CONFIG_ID",
            var("TICKETDESK_CONFIG_ID"),
            DEFAULT_CONFIG_ID,
        )?;
        if config_id == 0 {
            return Err(AppError::InvalidConfig {
                field: "TICKETDESK_CONFIG_ID",
                reason: "zero",
                value: config_id.to_string(),
            });
        }
        let bind_addr = parse_value(
            "TICKETDESK_BIND_ADDR",
            var("TICKETDESK_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;
        let max_connections = parse_var(
            "TICKETDESK_DB_MAX_CONNECTIONS",
            var("TICKETDESK_DB_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let session_ttl = parse_var(
            "TICKETDESK_SESSION_TTL_SECS",
            var("TICKETDESK_SESSION_TTL_SECS"),
            DEFAULT_SESSION_TTL.as_secs(),
        )?;
        let idle_timeout = parse_var(
            "TICKETDESK_SESSION_IDLE_SECS",
            var("TICKETDESK_SESSION_IDLE_SECS"),
            DEFAULT_IDLE_TIMEOUT.as_secs(),
        )?;

        Ok(Self {
            database_url,
            config_id,
            bind_addr,
            max_connections,
            log_level: var("TICKETDESK_LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: var("TICKETDESK_LOG_FORMAT")
                .map_or_else(LogFormat::infer, |name| LogFormat::from_name(&name)),
            session_ttl: Duration::from_secs(session_ttl),
            idle_timeout: Duration::from_secs(idle_timeout),
            expected_schema_signature: var("TICKETDESK_SCHEMA_SIGNATURE"),
            system_admin_email: var("TICKETDESK_ADMIN_EMAIL")
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
        })
    }

    /// Per-request bootstrap options derived from these settings.
    #[must_use]
    pub fn bootstrap_options(&self) -> BootstrapOptions {
        BootstrapOptions {
            session_ttl: self.session_ttl,
            expected_schema_signature: self.expected_schema_signature.clone(),
            system_admin_email: self.system_admin_email.clone(),
            ..BootstrapOptions::default()
        }
    }
}

fn parse_var<T: FromStr>(field: &'static str, value: Option<String>, default: T) -> AppResult<T> {
    value.map_or(Ok(default), |raw| parse_value(field, raw))
}

fn parse_value<T: FromStr>(field: &'static str, raw: String) -> AppResult<T> {
    raw.parse().map_err(|_| AppError::InvalidConfig {
        field,
        reason: "unparseable",
        value: raw,
    })
}

/// Entry point for the ticketdesk boot sequence.
///
/// # Errors
///
/// Returns an error if settings are invalid, the database is unreachable, or the
/// listener fails.
pub async fn run_app() -> AppResult<()> {
    let settings = AppSettings::from_env()?;
    run_app_with(settings).await
}

async fn run_app_with(settings: AppSettings) -> AppResult<()> {
    init_logging(&LoggingConfig {
        level: &settings.log_level,
        format: settings.log_format,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!(config_id = settings.config_id, "ticketdesk bootstrap starting");

    let pool = connect(&settings.database_url, settings.max_connections)
        .await
        .map_err(|err| AppError::data("data.connect", err))?;
    apply_migrations(&pool)
        .await
        .map_err(|err| AppError::data("data.migrate", err))?;

    let sessions = Arc::new(PgSessionStore::with_idle_timeout(
        pool.clone(),
        settings.idle_timeout,
    ));
    let sweeper = spawn_session_sweeper(Arc::clone(&sessions), SESSION_SWEEP_INTERVAL);
    let collaborators = Collaborators {
        config: Arc::new(PgConfigStore::new(pool.clone())),
        sessions,
        logs: Arc::new(PgLogStore::new(pool.clone())),
        mailer: Arc::new(PgMailOutbox::new(pool.clone())),
    };

    let server = ApiServer::new(ApiState::new(
        settings.config_id,
        collaborators,
        settings.bootstrap_options(),
    ));
    let served = server
        .serve(settings.bind_addr)
        .await
        .map_err(|err| AppError::api_server("api_server.serve", err));

    sweeper.abort();
    pool.close().await;
    served
}

fn spawn_session_sweeper(sessions: Arc<PgSessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired sessions purged"),
                Err(err) => warn!(error = %err, "session purge failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> AppResult<AppSettings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        AppSettings::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() -> AppResult<()> {
        let settings = settings(&[("DATABASE_URL", "postgres://localhost/ticketdesk")])?;
        assert_eq!(settings.config_id, 1);
        assert_eq!(settings.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(settings.max_connections, 10);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.session_ttl, DEFAULT_SESSION_TTL);
        assert_eq!(settings.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(settings.expected_schema_signature, None);
        assert_eq!(settings.system_admin_email, DEFAULT_ADMIN_EMAIL);
        Ok(())
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = settings(&[("DATABASE_URL", "  ")]).err();
        assert!(matches!(
            err,
            Some(AppError::MissingEnv {
                name: "DATABASE_URL"
            })
        ));
    }

    #[test]
    fn malformed_or_zero_profile_is_rejected() {
        let malformed = settings(&[
            ("DATABASE_URL", "postgres://localhost/ticketdesk"),
            ("TICKETDESK_CONFIG_ID", "first"),
        ])
        .err();
        assert!(matches!(
            malformed,
            Some(AppError::InvalidConfig {
                field: "TICKETDESK_CONFIG_ID",
                reason: "unparseable",
                ..
            })
        ));

        let zero = settings(&[
            ("DATABASE_URL", "postgres://localhost/ticketdesk"),
            ("TICKETDESK_CONFIG_ID", "0"),
        ])
        .err();
        assert!(matches!(
            zero,
            Some(AppError::InvalidConfig { reason: "zero", .. })
        ));
    }

    #[test]
    fn overrides_flow_into_bootstrap_options() -> AppResult<()> {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/ticketdesk"),
            ("TICKETDESK_CONFIG_ID", "3"),
            ("TICKETDESK_BIND_ADDR", "0.0.0.0:9000"),
            ("TICKETDESK_LOG_FORMAT", "json"),
            ("TICKETDESK_SESSION_TTL_SECS", "600"),
            ("TICKETDESK_SCHEMA_SIGNATURE", "5fb92bef"),
            ("TICKETDESK_ADMIN_EMAIL", "ops@example.com"),
        ])?;
        assert_eq!(settings.config_id, 3);
        assert_eq!(settings.bind_addr.port(), 9000);
        assert_eq!(settings.log_format, LogFormat::Json);

        let options = settings.bootstrap_options();
        assert_eq!(options.session_ttl, Duration::from_secs(600));
        assert_eq!(options.expected_schema_signature.as_deref(), Some("5fb92bef"));
        assert_eq!(options.system_admin_email, "ops@example.com");
        assert_eq!(options.token_name, BootstrapOptions::default().token_name);
        Ok(())
    }
}
