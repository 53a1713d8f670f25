//! The per-request application context.
//!
//! # Design
//! - `AppContext::start` resolves the profile, starts the session and prepares the
//!   guard and logger; it either returns a complete context or a `BootstrapError`.
//! - Process-level knobs arrive through `BootstrapOptions`; nothing is read from
//!   globals.
//! - One context serves one request and is dropped with it.

use std::sync::Arc;
use std::time::Duration;

use ticketdesk_config::{ConfigBinding, ConfigId, Configuration, SharedConfigStore};
use tracing::{info, warn};

use crate::csrf::{CsrfGuard, CsrfVerdict, DEFAULT_TOKEN_NAME};
use crate::error::{BootstrapResult, CsrfError, SessionResult};
use crate::mail::SharedMailer;
use crate::notices::Notices;
use crate::priority::Priority;
use crate::request::RequestSurface;
use crate::session::{DEFAULT_SESSION_TTL, Session, SessionBootstrap, SessionId, SharedSessionStore};
use crate::syslog::{LogSinks, Logger, RequestOrigin, SharedLogStore};
use crate::upload::{TransferVerifier, UploadCandidate, UploadPolicy};

/// Recipient of alerts when the profile names no administrator.
pub const DEFAULT_ADMIN_EMAIL: &str = "root@localhost";

/// External services a context talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Configuration profiles.
    pub config: SharedConfigStore,
    /// Session backend.
    pub sessions: SharedSessionStore,
    /// Audit log destination.
    pub logs: SharedLogStore,
    /// Alert transport.
    pub mailer: SharedMailer,
}

/// Process-level settings applied to every bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Lifetime of persistent sessions.
    pub session_ttl: Duration,
    /// Form field carrying the anti-forgery token.
    pub token_name: String,
    /// Schema signature the running code expects; `None` disables upgrade detection.
    pub expected_schema_signature: Option<String>,
    /// Alert recipient used when the profile has no administrator address.
    pub system_admin_email: String,
    /// Application version reported by the context.
    pub version: String,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            expected_schema_signature: None,
            system_admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Everything a request handler needs from the application core.
pub struct AppContext {
    config: Arc<Configuration>,
    session: Session,
    sessions: SessionBootstrap,
    csrf: CsrfGuard,
    logger: Logger,
    uploads: UploadPolicy,
    upgrade_pending: bool,
    version: String,
    notices: Notices,
    extra_headers: Vec<String>,
}

impl AppContext {
    /// Bootstrap the context for profile `config_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BootstrapError`] when the profile is unset, missing,
    /// mislabelled or invalid, or when the session backend fails.
    pub async fn start(
        config_id: ConfigId,
        request: &dyn RequestSurface,
        session_id: Option<&SessionId>,
        collaborators: &Collaborators,
        options: &BootstrapOptions,
    ) -> BootstrapResult<Self> {
        let binding = ConfigBinding::new(Arc::clone(&collaborators.config));
        let config = binding.resolve(config_id).await?;

        let sessions = SessionBootstrap::new(Arc::clone(&collaborators.sessions), options.session_ttl);
        let session = sessions.start(&config, session_id).await?;

        let upgrade_pending = config.upgrade_pending(options.expected_schema_signature.as_deref());
        if upgrade_pending {
            warn!(
                config_id,
                stored = %config.schema_signature,
                "schema upgrade pending; logging everything"
            );
        }

        let logger = Logger::new(
            Arc::clone(&config),
            LogSinks {
                store: Arc::clone(&collaborators.logs),
                mailer: Arc::clone(&collaborators.mailer),
            },
            RequestOrigin {
                page: request.page().to_string(),
                remote_addr: request.remote_addr().to_string(),
            },
            options.system_admin_email.clone(),
        )
        .with_upgrade_pending(upgrade_pending);

        info!(
            config_id,
            session_kind = session.kind().as_str(),
            page = request.page(),
            "request context ready"
        );

        Ok(Self {
            uploads: UploadPolicy::new(Arc::clone(&config)),
            config,
            session,
            sessions,
            csrf: CsrfGuard::new(options.token_name.clone()),
            logger,
            upgrade_pending,
            version: options.version.clone(),
            notices: Notices::default(),
            extra_headers: Vec::new(),
        })
    }

    /// Resolved configuration snapshot.
    #[must_use]
    pub const fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Identifier of the resolved profile.
    #[must_use]
    pub fn config_id(&self) -> ConfigId {
        self.config.id
    }

    /// Application version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Current session, for in-request changes.
    pub const fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Anti-forgery guard.
    #[must_use]
    pub const fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    /// Request-scoped logger.
    #[must_use]
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Upload rules for this profile.
    #[must_use]
    pub const fn upload_policy(&self) -> &UploadPolicy {
        &self.uploads
    }

    /// Whether the stored schema differs from the expected one.
    #[must_use]
    pub const fn is_upgrade_pending(&self) -> bool {
        self.upgrade_pending
    }

    /// Whether the help desk is serving requests.
    #[must_use]
    pub fn is_system_online(&self) -> bool {
        self.config.helpdesk_online && !self.upgrade_pending
    }

    /// Session token, issuing one if needed.
    pub fn csrf_token(&mut self) -> String {
        self.csrf.issue_or_get(&mut self.session)
    }

    /// Hidden form input carrying the session token.
    pub fn csrf_form_input(&mut self) -> String {
        self.csrf.render_hidden_field(&mut self.session)
    }

    /// Whether `token` is the current session token.
    #[must_use]
    pub fn validate_csrf_token(&self, token: &str) -> bool {
        self.csrf.validate(&self.session, token)
    }

    /// Check the request for a valid token, logging a warning on failure.
    ///
    /// `field` overrides the guard's form field name.
    pub async fn check_csrf(&self, request: &dyn RequestSurface, field: Option<&str>) -> bool {
        self.require_csrf(request, field).await.is_ok()
    }

    /// Like [`Self::check_csrf`] but returns a typed error for `?` propagation.
    ///
    /// # Errors
    ///
    /// Returns [`CsrfError::Invalid`] when neither the form field nor the header
    /// carries the session token.
    pub async fn require_csrf(
        &self,
        request: &dyn RequestSurface,
        field: Option<&str>,
    ) -> Result<(), CsrfError> {
        match self.csrf.inspect(&self.session, request, field) {
            CsrfVerdict::Accepted => Ok(()),
            CsrfVerdict::Rejected {
                field,
                form_value,
                header_value,
            } => {
                let title = format!("Invalid CSRF Token {field}");
                let message = format!(
                    "Invalid CSRF token [form: {form_value}, header: {header_value}] on {}",
                    request.page()
                );
                self.logger.log_warning(&title, &message, true).await;
                Err(CsrfError::Invalid { field })
            }
        }
    }

    /// Whether the extension of `name` is allowed.
    #[must_use]
    pub fn is_file_type_allowed(&self, name: &str) -> bool {
        self.uploads.is_file_type_allowed(name)
    }

    /// Annotate rejected candidates; `true` when every candidate passed.
    pub fn validate_file_uploads(
        &self,
        candidates: &mut [UploadCandidate],
        verifier: &dyn TransferVerifier,
    ) -> bool {
        self.uploads.validate_batch(candidates, verifier)
    }

    /// See [`Logger::log`].
    pub async fn log(&self, priority: Priority, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log(priority, title, message, alert).await
    }

    /// See [`Logger::log_debug`].
    pub async fn log_debug(&self, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log_debug(title, message, alert).await
    }

    /// See [`Logger::log_info`].
    pub async fn log_info(&self, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log_info(title, message, alert).await
    }

    /// See [`Logger::log_warning`].
    pub async fn log_warning(&self, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log_warning(title, message, alert).await
    }

    /// See [`Logger::log_error`].
    pub async fn log_error(&self, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log_error(title, message, alert).await
    }

    /// See [`Logger::log_db_error`].
    pub async fn log_db_error(&self, title: &str, message: &str, alert: bool) -> bool {
        self.logger.log_db_error(title, message, alert).await
    }

    /// See [`Logger::alert_admin`].
    pub async fn alert_admin(&self, subject: &str, body: &str, audit: bool) -> bool {
        self.logger.alert_admin(subject, body, audit).await
    }

    /// See [`Logger::purge_logs`].
    pub async fn purge_logs(&self) -> bool {
        self.logger.purge_logs().await
    }

    /// Notices for the rendered page.
    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Notices, for setting or clearing.
    pub const fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    /// Queue a raw response header line; duplicates are ignored.
    pub fn add_extra_header(&mut self, header: impl Into<String>) {
        let header = header.into();
        if !self.extra_headers.contains(&header) {
            self.extra_headers.push(header);
        }
    }

    /// Queued header lines in insertion order.
    #[must_use]
    pub fn extra_headers(&self) -> &[String] {
        &self.extra_headers
    }

    /// Persist session changes made during the request.
    ///
    /// # Errors
    ///
    /// Propagates any failure raised by the session store.
    pub async fn commit_session(&self) -> SessionResult<()> {
        self.sessions.commit(&self.session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::CSRF_HEADER;
    use crate::error::{BootstrapError, SessionError};
    use crate::priority::Severity;
    use crate::request::RequestInfo;
    use crate::session::{MemorySessionStore, SessionKind, SessionStore};
    use crate::testing::{Fakes, sample_config};
    use async_trait::async_trait;
    use std::path::Path;
    use ticketdesk_config::{ConfigError, ConfigStore, MemoryConfigStore};

    struct Harness {
        fakes: Fakes,
        sessions: Arc<MemorySessionStore>,
        collaborators: Collaborators,
    }

    impl Harness {
        fn with_config(config: Configuration) -> Self {
            let fakes = Fakes::new();
            let sessions = Arc::new(MemorySessionStore::new());
            let collaborators = Collaborators {
                config: Arc::new([config].into_iter().collect::<MemoryConfigStore>()),
                sessions: sessions.clone(),
                logs: fakes.logs.clone(),
                mailer: fakes.mailer.clone(),
            };
            Self {
                fakes,
                sessions,
                collaborators,
            }
        }

        async fn start(&self, options: &BootstrapOptions) -> BootstrapResult<AppContext> {
            AppContext::start(1, &request(), None, &self.collaborators, options).await
        }
    }

    fn request() -> RequestInfo {
        RequestInfo::new("/scp/tickets.php", "198.51.100.4")
    }

    struct MislabelledStore;

    #[async_trait]
    impl ConfigStore for MislabelledStore {
        async fn lookup(&self, _id: ConfigId) -> ticketdesk_config::ConfigResult<Option<Configuration>> {
            let mut config = sample_config();
            config.id = 9;
            Ok(Some(config))
        }
    }

    struct BrokenSessions;

    #[async_trait]
    impl SessionStore for BrokenSessions {
        async fn start_persistent(&self, _id: Option<&SessionId>, _ttl: Duration) -> SessionResult<Session> {
            Err(SessionError::store("start", std::io::Error::other("sessions table missing")))
        }

        async fn start_ephemeral(&self, _id: Option<&SessionId>) -> SessionResult<Session> {
            Err(SessionError::store("start", std::io::Error::other("sessions table missing")))
        }

        async fn save(&self, _session: &Session) -> SessionResult<()> {
            Ok(())
        }
    }

    struct Accepting;

    impl TransferVerifier for Accepting {
        fn is_completed_upload(&self, _handle: &Path) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn start_builds_a_complete_context() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());
        let context = harness.start(&BootstrapOptions::default()).await?;

        assert_eq!(context.config_id(), 1);
        assert_eq!(context.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(context.session().kind(), SessionKind::Ephemeral);
        assert_eq!(context.session().tz_offset(), Some(-5.0));
        assert_eq!(context.csrf().name(), DEFAULT_TOKEN_NAME);
        assert!(context.is_system_online());
        assert!(!context.is_upgrade_pending());
        assert!(context.notices().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unset_or_unknown_profiles_fail_bootstrap() {
        let harness = Harness::with_config(sample_config());
        let options = BootstrapOptions::default();

        let unset = AppContext::start(0, &request(), None, &harness.collaborators, &options).await;
        assert!(matches!(unset, Err(BootstrapError::ConfigNotFound { id: 0 })));

        let unknown = AppContext::start(7, &request(), None, &harness.collaborators, &options).await;
        assert!(matches!(unknown, Err(BootstrapError::ConfigNotFound { id: 7 })));
        assert!(harness.sessions.is_empty());
    }

    #[tokio::test]
    async fn mislabelled_profile_fails_bootstrap() {
        let harness = Harness::with_config(sample_config());
        let collaborators = Collaborators {
            config: Arc::new(MislabelledStore),
            ..harness.collaborators.clone()
        };
        let result =
            AppContext::start(1, &request(), None, &collaborators, &BootstrapOptions::default()).await;
        assert!(matches!(
            result,
            Err(BootstrapError::ConfigMismatch {
                requested: 1,
                resolved: 9
            })
        ));
    }

    #[tokio::test]
    async fn invalid_profile_fails_bootstrap() {
        let mut config = sample_config();
        config.log_level = 9;
        let harness = Harness::with_config(config);
        let result = harness.start(&BootstrapOptions::default()).await;
        assert!(matches!(
            result,
            Err(BootstrapError::Config {
                source: ConfigError::InvalidField {
                    field: "log_level",
                    ..
                }
            })
        ));
    }

    #[tokio::test]
    async fn session_failures_fail_bootstrap() {
        let harness = Harness::with_config(sample_config());
        let collaborators = Collaborators {
            sessions: Arc::new(BrokenSessions),
            ..harness.collaborators.clone()
        };
        let result =
            AppContext::start(1, &request(), None, &collaborators, &BootstrapOptions::default()).await;
        assert!(matches!(result, Err(BootstrapError::Session { .. })));
    }

    #[tokio::test]
    async fn upgrade_detection_is_case_insensitive() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());

        let same = BootstrapOptions {
            expected_schema_signature: Some("B4A8F2".to_string()),
            ..BootstrapOptions::default()
        };
        assert!(!harness.start(&same).await?.is_upgrade_pending());

        let newer = BootstrapOptions {
            expected_schema_signature: Some("c91d00".to_string()),
            ..BootstrapOptions::default()
        };
        let context = harness.start(&newer).await?;
        assert!(context.is_upgrade_pending());
        assert!(!context.is_system_online());
        Ok(())
    }

    #[tokio::test]
    async fn offline_help_desk_is_not_online() -> BootstrapResult<()> {
        let mut config = sample_config();
        config.helpdesk_online = false;
        let harness = Harness::with_config(config);
        assert!(!harness.start(&BootstrapOptions::default()).await?.is_system_online());
        Ok(())
    }

    #[tokio::test]
    async fn missing_csrf_token_logs_one_warning_and_alerts_once() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());
        let mut context = harness.start(&BootstrapOptions::default()).await?;
        context.csrf_token();

        assert!(!context.check_csrf(&request(), None).await);

        let entries = harness.fakes.logs.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[0].title, "Invalid CSRF Token __CSRFToken__");
        assert_eq!(
            entries[0].message,
            "Invalid CSRF token [form: , header: ] on /scp/tickets.php"
        );
        assert_eq!(entries[0].ip_address, "198.51.100.4");

        let sent = harness.fakes.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "admin@example.com");
        assert_eq!(sent[0].subject, "Invalid CSRF Token __CSRFToken__");
        assert_eq!(
            sent[0].body,
            "Invalid CSRF token [form: , header: ] on /scp/tickets.php\n\n/scp/tickets.php"
        );
        Ok(())
    }

    #[tokio::test]
    async fn valid_csrf_token_passes_silently() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());
        let mut context = harness.start(&BootstrapOptions::default()).await?;
        let token = context.csrf_token();

        assert!(context.validate_csrf_token(&token));
        assert!(!context.validate_csrf_token(""));

        let via_header = request().with_header(CSRF_HEADER, token.clone());
        assert!(context.check_csrf(&via_header, None).await);
        assert_eq!(context.require_csrf(&via_header, None).await, Ok(()));
        assert!(harness.fakes.logs.entries().is_empty());
        assert!(harness.fakes.mailer.sent().is_empty());

        assert!(context.csrf_form_input().contains(&token));
        Ok(())
    }

    #[tokio::test]
    async fn require_csrf_reports_typed_error() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());
        let options = BootstrapOptions {
            token_name: "ajax_token".to_string(),
            ..BootstrapOptions::default()
        };
        let context = harness.start(&options).await?;
        let forged = request().with_form_field("ajax_token", "forged");
        assert_eq!(
            context.require_csrf(&forged, None).await,
            Err(CsrfError::Invalid {
                field: "ajax_token".to_string()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn committed_tokens_survive_the_next_request() -> Result<(), Box<dyn std::error::Error>> {
        let harness = Harness::with_config(sample_config());
        let options = BootstrapOptions::default();
        let mut first = harness.start(&options).await?;
        let token = first.csrf_token();
        first.commit_session().await?;

        let second = AppContext::start(
            1,
            &request(),
            Some(first.session().id()),
            &harness.collaborators,
            &options,
        )
        .await?;
        assert_eq!(second.session().id(), first.session().id());
        assert!(second.validate_csrf_token(&token));
        Ok(())
    }

    #[tokio::test]
    async fn uploads_and_logging_delegate_to_profile() -> BootstrapResult<()> {
        let mut config = sample_config();
        config.log_level = 1;
        config.allowed_file_types = Some("jpg, png".to_string());
        let harness = Harness::with_config(config);
        let context = harness.start(&BootstrapOptions::default()).await?;

        assert!(!context.is_file_type_allowed("photo.GIF"));
        let mut batch = vec![UploadCandidate::new("photo.GIF", "/tmp/x", 1)];
        assert!(!context.validate_file_uploads(&mut batch, &Accepting));

        assert!(!context.log_warning("Disk", "almost full", false).await);
        assert!(harness.fakes.logs.entries().is_empty());
        assert!(context.log_error("DB", "gone", false).await);
        assert_eq!(harness.fakes.logs.entries()[0].severity, Severity::Error);
        assert!(context.purge_logs().await);
        Ok(())
    }

    #[tokio::test]
    async fn extra_headers_are_deduplicated_in_order() -> BootstrapResult<()> {
        let harness = Harness::with_config(sample_config());
        let mut context = harness.start(&BootstrapOptions::default()).await?;
        context.add_extra_header("X-Frame-Options: DENY");
        context.add_extra_header("Cache-Control: no-store");
        context.add_extra_header("X-Frame-Options: DENY");
        assert_eq!(
            context.extra_headers(),
            ["X-Frame-Options: DENY", "Cache-Control: no-store"]
        );

        context.notices_mut().set_error("Access denied");
        assert_eq!(context.notices().error(), Some("Access denied"));
        Ok(())
    }
}
