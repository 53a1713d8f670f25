//! Request-facing surface consumed by the context.
//!
//! The HTTP layer owns parsing; the core only needs named lookups, the page being
//! served, and the peer address for the audit trail.

use std::collections::HashMap;

/// Read-only view of the inbound request.
pub trait RequestSurface: Send + Sync {
    /// Value of a form-encoded body field.
    fn form_field(&self, name: &str) -> Option<&str>;
    /// Value of a request header. Lookups are case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;
    /// Identifier of the page or route being served.
    fn page(&self) -> &str;
    /// Remote peer address recorded with audit entries.
    fn remote_addr(&self) -> &str;
}

/// Owned request snapshot, built by adapters or directly in tests.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    page: String,
    remote_addr: String,
    form: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl RequestInfo {
    /// Start a snapshot for `page` served to `remote_addr`.
    #[must_use]
    pub fn new(page: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            remote_addr: remote_addr.into(),
            ..Self::default()
        }
    }

    /// Attach a form field.
    #[must_use]
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Attach a header; the name is stored lower-cased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replace all form fields.
    #[must_use]
    pub fn with_form(mut self, form: HashMap<String, String>) -> Self {
        self.form = form;
        self
    }
}

impl RequestSurface for RequestInfo {
    fn form_field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn page(&self) -> &str {
        &self.page
    }

    fn remote_addr(&self) -> &str {
        &self.remote_addr
    }
}
