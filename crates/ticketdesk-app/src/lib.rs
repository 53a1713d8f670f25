#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! ticketdesk application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (environment settings and service wiring), `error.rs`
//! (`AppError`).

/// Environment loading and service wiring.
pub mod bootstrap;
/// Application-level errors.
pub mod error;

pub use bootstrap::{AppSettings, run_app};
pub use error::{AppError, AppResult};
