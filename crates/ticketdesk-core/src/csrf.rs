//! Per-session anti-forgery tokens.

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use subtle::ConstantTimeEq;

use crate::request::RequestSurface;
use crate::session::Session;

/// Form field name used when none is configured.
pub const DEFAULT_TOKEN_NAME: &str = "__CSRFToken__";
/// Header consulted when the form field is missing or wrong.
pub const CSRF_HEADER: &str = "X-CSRFToken";
/// Session key holding the current token.
pub const SESSION_CSRF_TOKEN: &str = "csrf_token";
/// Generated token length in characters.
pub const TOKEN_LENGTH: usize = 40;

/// Outcome of inspecting a request for a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfVerdict {
    /// The form field or header carried the session token.
    Accepted,
    /// Neither source matched; carries what was submitted.
    Rejected {
        /// Form field that was inspected.
        field: String,
        /// Submitted form value, empty when absent.
        form_value: String,
        /// Submitted header value, empty when absent.
        header_value: String,
    },
}

impl CsrfVerdict {
    /// Whether the request passed.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Issues and checks the token stored in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfGuard {
    name: String,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_NAME)
    }
}

impl CsrfGuard {
    /// Guard whose form field is `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Form field carrying the token.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current token, if one was issued.
    #[must_use]
    pub fn token<'s>(&self, session: &'s Session) -> Option<&'s str> {
        session
            .get_str(SESSION_CSRF_TOKEN)
            .filter(|token| !token.is_empty())
    }

    /// Return the session token, generating and storing one first if needed.
    pub fn issue_or_get(&self, session: &mut Session) -> String {
        if let Some(token) = self.token(session) {
            return token.to_string();
        }
        let token = generate_token();
        session.insert(SESSION_CSRF_TOKEN, token.clone());
        token
    }

    /// Hidden form input carrying the token.
    pub fn render_hidden_field(&self, session: &mut Session) -> String {
        let token = self.issue_or_get(session);
        format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
            escape_attribute(&self.name),
            escape_attribute(&token)
        )
    }

    /// Whether `candidate` is the live session's current token.
    #[must_use]
    pub fn validate(&self, session: &Session, candidate: &str) -> bool {
        if candidate.is_empty() || !session.is_active(Utc::now()) {
            return false;
        }
        self.token(session).is_some_and(|token| {
            bool::from(token.as_bytes().ct_eq(candidate.as_bytes()))
        })
    }

    /// Check the form field (`field` or the guard's name) and then the header.
    #[must_use]
    pub fn inspect(
        &self,
        session: &Session,
        request: &dyn RequestSurface,
        field: Option<&str>,
    ) -> CsrfVerdict {
        let field = field.unwrap_or(&self.name);
        let form_value = request.form_field(field).unwrap_or_default();
        if self.validate(session, form_value) {
            return CsrfVerdict::Accepted;
        }

        let header_value = request.header(CSRF_HEADER).unwrap_or_default();
        if self.validate(session, header_value) {
            return CsrfVerdict::Accepted;
        }

        CsrfVerdict::Rejected {
            field: field.to_string(),
            form_value: form_value.to_string(),
            header_value: header_value.to_string(),
        }
    }
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn escape_attribute(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}
