#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! PostgreSQL backends for ticketdesk: configuration profiles, persistent
//! sessions, the system log and the mail outbox, plus pool setup and embedded
//! migrations.

pub mod config;
pub mod error;
pub mod outbox;
pub mod session;
pub mod syslog;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use config::PgConfigStore;
pub use error::{DataError, Result as DataResult};
pub use outbox::{PgMailOutbox, QueuedMail};
pub use session::PgSessionStore;
pub use syslog::PgLogStore;

/// Open a connection pool against `database_url`.
///
/// # Errors
///
/// Returns an error when the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> DataResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|source| DataError::ConnectFailed { source })
}

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn apply_migrations(pool: &PgPool) -> DataResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|source| DataError::MigrationFailed { source })?;
    tracing::info!("ticketdesk migrations applied");
    Ok(())
}
