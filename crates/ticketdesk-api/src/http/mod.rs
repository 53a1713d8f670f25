//! HTTP surface modules (router, handlers, request adaptation).

/// Shared constants and header names.
pub mod constants;
/// Problem response helpers and error types.
pub mod errors;
/// Route handlers.
pub(crate) mod handlers;
/// Adapter from axum requests to the core request surface.
pub(crate) mod inbound;
/// Router construction and server host.
pub mod router;
/// Request context propagation middleware.
pub(crate) mod telemetry;
