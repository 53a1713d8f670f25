#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! Per-request application context for the ticketdesk help desk.
//!
//! Layout: `context.rs` (`AppContext` bootstrap and accessors), `session.rs`
//! (sessions and their stores), `csrf.rs` (anti-forgery tokens), `upload.rs`
//! (file policy), `syslog.rs` (tiered audit log and admin alerts), `priority.rs`
//! (priority to tier mapping), `mail.rs` and `request.rs` (collaborator surfaces),
//! `notices.rs` (page notices), `error.rs` (error taxonomy).

pub mod context;
pub mod csrf;
pub mod error;
pub mod mail;
pub mod notices;
pub mod priority;
pub mod request;
pub mod session;
pub mod syslog;
pub mod upload;

#[cfg(test)]
mod testing;

pub use context::{AppContext, BootstrapOptions, Collaborators, DEFAULT_ADMIN_EMAIL};
pub use csrf::{CSRF_HEADER, CsrfGuard, CsrfVerdict, DEFAULT_TOKEN_NAME};
pub use error::{
    BootstrapError, BootstrapResult, CollaboratorError, CsrfError, LogStoreError, LogStoreResult,
    MailError, MailResult, SessionError, SessionResult, UploadError,
};
pub use mail::{Mailer, SharedMailer};
pub use notices::Notices;
pub use priority::{Priority, Severity};
pub use request::{RequestInfo, RequestSurface};
pub use session::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_SESSION_TTL, MemorySessionStore, Session, SessionBootstrap,
    SessionId, SessionKind, SessionStore, SharedSessionStore,
};
pub use syslog::{AlertMode, LogEntry, LogSinks, LogStore, Logger, RequestOrigin, SharedLogStore};
pub use upload::{
    TempDirVerifier, TransferVerifier, UploadCandidate, UploadPolicy, format_file_size,
};
