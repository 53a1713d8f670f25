//! Flash-style notices shown on the rendered page.

use serde::Serialize;

/// Error, warning and informational notices for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Notices {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Notices {
    /// Current error notice.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replace the error notice.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = non_blank(error.into());
    }

    /// Drop the error notice.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Current warning notice.
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Replace the warning notice.
    pub fn set_warning(&mut self, warning: impl Into<String>) {
        self.warning = non_blank(warning.into());
    }

    /// Drop the warning notice.
    pub fn clear_warning(&mut self) {
        self.warning = None;
    }

    /// Current informational notice.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Replace the informational notice.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = non_blank(message.into());
    }

    /// Drop the informational notice.
    pub fn clear_message(&mut self) {
        self.message = None;
    }

    /// Whether no notice is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.error.is_none() && self.warning.is_none() && self.message.is_none()
    }
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}
