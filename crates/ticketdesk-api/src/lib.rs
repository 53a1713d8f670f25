#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::pedantic)]

//! Axum surface for ticketdesk.
//!
//! Every request bootstraps its own `AppContext`: the session comes from the
//! session cookie, state-changing routes require the anti-forgery token, and
//! failures are rendered as problem details.

pub mod error;
pub mod http;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::constants::SESSION_COOKIE;
pub use http::errors::ProblemDetails;
pub use http::router::ApiServer;
pub use state::ApiState;
