#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! Configuration snapshots for help desk profiles and the binding that resolves them.
//!
//! Layout: `model.rs` (the immutable snapshot and sender accounts), `validate.rs`
//! (range checks and text parsing), `service.rs` (`ConfigStore`, `ConfigBinding`,
//! `MemoryConfigStore`).

pub mod error;
pub mod model;
pub mod service;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{ConfigId, Configuration, EmailAccount};
pub use service::{ConfigBinding, ConfigStore, MemoryConfigStore, SharedConfigStore};
