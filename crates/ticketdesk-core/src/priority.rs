//! Log priorities and the three persisted severity tiers.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Fine-grained priority of a log call, mirroring syslog levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// System is unusable.
    Emergency,
    /// Action must be taken immediately.
    Alert,
    /// Critical conditions.
    Critical,
    /// Error conditions.
    Error,
    /// Warning conditions.
    Warning,
    /// Normal but significant condition.
    Notice,
    /// Informational messages.
    Info,
    /// Debug-level messages.
    Debug,
}

impl Priority {
    /// Every priority, most severe first.
    pub const ALL: [Self; 8] = [
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// Tier this priority is persisted under.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Emergency | Self::Alert | Self::Critical | Self::Error => Severity::Error,
            Self::Warning => Severity::Warning,
            Self::Notice | Self::Info | Self::Debug => Severity::Debug,
        }
    }
}

/// Coarse tier recorded with every log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Tier 1.
    Error,
    /// Tier 2.
    Warning,
    /// Tier 3.
    Debug,
}

impl Severity {
    /// Numeric tier compared against the configured log level.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Warning => 2,
            Self::Debug => 3,
        }
    }

    /// Name stored in the log type column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Debug => "Debug",
        }
    }

    /// Parse a stored tier name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Error" => Some(Self::Error),
            "Warning" => Some(Self::Warning),
            "Debug" => Some(Self::Debug),
            _ => None,
        }
    }

    /// Whether a profile logging up to `log_level` keeps entries of this tier.
    #[must_use]
    pub const fn is_within(self, log_level: u8) -> bool {
        self.level() <= log_level
    }
}

impl From<Priority> for Severity {
    fn from(priority: Priority) -> Self {
        priority.severity()
    }
}

impl Display for Severity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_family_maps_to_error_tier() {
        for priority in [
            Priority::Emergency,
            Priority::Alert,
            Priority::Critical,
            Priority::Error,
        ] {
            assert_eq!(Severity::from(priority), Severity::Error);
        }
    }

    #[test]
    fn warning_maps_to_warning_tier() {
        assert_eq!(Priority::Warning.severity(), Severity::Warning);
    }

    #[test]
    fn informational_family_maps_to_debug_tier() {
        for priority in [Priority::Notice, Priority::Info, Priority::Debug] {
            assert_eq!(priority.severity(), Severity::Debug);
        }
    }

    #[test]
    fn mapping_is_total_and_stable() {
        for priority in Priority::ALL {
            let tier = priority.severity();
            assert_eq!(tier, priority.severity());
            assert!((1..=3).contains(&tier.level()));
            assert_eq!(Severity::from_name(tier.as_str()), Some(tier));
        }
    }

    #[test]
    fn level_threshold_keeps_lower_tiers() {
        assert!(Severity::Error.is_within(1));
        assert!(!Severity::Warning.is_within(1));
        assert!(Severity::Warning.is_within(2));
        assert!(!Severity::Debug.is_within(2));
        assert!(Severity::Debug.is_within(3));
    }
}
