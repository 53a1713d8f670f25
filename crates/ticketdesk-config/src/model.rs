//! Typed configuration snapshot.
//!
//! # Design
//! - A snapshot is immutable once resolved and is shared behind `Arc` across a request.
//! - Raw text fields (file type policy, grace period) stay as stored; typed views are
//!   derived through `validate.rs` so a malformed value degrades the feature, not the request.

use serde::{Deserialize, Serialize};

use crate::validate::{parse_allowed_file_types, parse_grace_period};

/// Numeric identifier of a help desk configuration profile. Zero means "unset".
pub type ConfigId = u32;

/// Named email account used as the sender of outbound mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAccount {
    /// Primary key of the account.
    pub id: u32,
    /// Mailbox address used in the `From` header.
    pub address: String,
    /// Optional display name.
    pub name: Option<String>,
}

impl EmailAccount {
    /// Render the account as an RFC 5322 mailbox (`"Name" <address>`).
    #[must_use]
    pub fn mailbox(&self) -> String {
        match self.name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => format!("\"{name}\" <{}>", self.address),
            None => self.address.clone(),
        }
    }
}

/// Immutable view of one help desk configuration profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Profile identifier.
    pub id: ConfigId,
    /// Stored data-schema version; `None` or zero marks the legacy schema.
    pub schema_version: Option<u32>,
    /// Signature of the stored data schema.
    pub schema_signature: String,
    /// Whether the help desk is accepting traffic.
    pub helpdesk_online: bool,
    /// Administrator mailbox receiving alerts.
    pub admin_email: Option<String>,
    /// Account dedicated to sending alerts.
    pub alert_email: Option<EmailAccount>,
    /// Fallback sender account.
    pub default_email: Option<EmailAccount>,
    /// Comma-separated list of allowed extensions (`.pdf, .png`) or `.*`.
    pub allowed_file_types: Option<String>,
    /// Largest accepted upload in bytes.
    pub max_file_size: u64,
    /// Highest severity tier that is persisted (1 = errors only, 3 = everything).
    pub log_level: u8,
    /// Log retention in months, stored as entered by the administrator.
    pub log_grace_period: Option<String>,
    /// Whether database errors notify the administrator.
    pub alert_on_sql_error: bool,
    /// Default timezone offset in hours.
    pub tz_offset: f32,
    /// Whether daylight saving time is observed by default.
    pub observe_dst: bool,
}

impl Configuration {
    /// Whether this profile predates versioned schemas.
    #[must_use]
    pub fn is_legacy_schema(&self) -> bool {
        self.schema_version.is_none_or(|version| version == 0)
    }

    /// Whether the stored schema differs from the signature the running code expects.
    ///
    /// No expectation means no upgrade can be pending. Signatures compare
    /// case-insensitively.
    #[must_use]
    pub fn upgrade_pending(&self, expected_signature: Option<&str>) -> bool {
        expected_signature
            .is_some_and(|expected| !expected.eq_ignore_ascii_case(&self.schema_signature))
    }

    /// Resolved administrator mailbox, ignoring blank values.
    #[must_use]
    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    /// Lower-cased allowed extensions, or `None` when every type is accepted.
    ///
    /// An absent or blank policy yields `Some(vec![])`, which allows nothing.
    #[must_use]
    pub fn allowed_file_types(&self) -> Option<Vec<String>> {
        parse_allowed_file_types(self.allowed_file_types.as_deref().unwrap_or_default())
    }

    /// Retention window in whole months, when configured as a number of at least one.
    #[must_use]
    pub fn log_grace_months(&self) -> Option<u32> {
        self.log_grace_period.as_deref().and_then(parse_grace_period)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn sample() -> Configuration {
        Configuration {
            id: 1,
            schema_version: Some(2),
            schema_signature: "abc123".to_string(),
            helpdesk_online: true,
            admin_email: Some("admin@example.com".to_string()),
            alert_email: None,
            default_email: None,
            allowed_file_types: Some(".pdf, .PNG".to_string()),
            max_file_size: 1_048_576,
            log_level: 2,
            log_grace_period: Some("12".to_string()),
            alert_on_sql_error: true,
            tz_offset: -5.0,
            observe_dst: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample;
    use super::*;

    #[test]
    fn legacy_schema_covers_missing_and_zero_versions() {
        let mut config = sample();
        assert!(!config.is_legacy_schema());
        config.schema_version = Some(0);
        assert!(config.is_legacy_schema());
        config.schema_version = None;
        assert!(config.is_legacy_schema());
    }

    #[test]
    fn upgrade_pending_compares_signatures_case_insensitively() {
        let config = sample();
        assert!(!config.upgrade_pending(None));
        assert!(!config.upgrade_pending(Some("ABC123")));
        assert!(config.upgrade_pending(Some("def456")));
    }

    #[test]
    fn admin_email_ignores_blank_values() {
        let mut config = sample();
        assert_eq!(config.admin_email(), Some("admin@example.com"));
        config.admin_email = Some("   ".to_string());
        assert_eq!(config.admin_email(), None);
    }

    #[test]
    fn mailbox_includes_display_name_when_present() {
        let mut account = EmailAccount {
            id: 3,
            address: "alerts@example.com".to_string(),
            name: Some("Support Alerts".to_string()),
        };
        assert_eq!(account.mailbox(), "\"Support Alerts\" <alerts@example.com>");
        account.name = None;
        assert_eq!(account.mailbox(), "alerts@example.com");
    }

    #[test]
    fn snapshot_round_trips_through_json() -> Result<(), serde_json::Error> {
        let config = sample();
        let encoded = serde_json::to_value(&config)?;
        assert_eq!(encoded["log_level"], 2);
        let decoded: Configuration = serde_json::from_value(encoded)?;
        assert_eq!(decoded, config);
        Ok(())
    }
}
