#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! Telemetry primitives shared across the ticketdesk workspace.
//!
//! Layout: `init.rs` (subscriber installation), `context.rs` (task-local request
//! context), `error.rs` (`TelemetryError`).

pub mod context;
pub mod error;
pub mod init;

pub use context::{current_request_id, current_route, set_request_context, with_request_context};
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
