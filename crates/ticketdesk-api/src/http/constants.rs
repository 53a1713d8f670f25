//! Shared HTTP constants (headers, cookies, problem URIs).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
/// Cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "TDSESSID";
pub(crate) const UNKNOWN_PEER: &str = "unknown";

pub(crate) const PROBLEM_INTERNAL: &str = "https://ticketdesk.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://ticketdesk.dev/problems/bad-request";
pub(crate) const PROBLEM_FORBIDDEN: &str = "https://ticketdesk.dev/problems/csrf-invalid";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://ticketdesk.dev/problems/service-unavailable";
