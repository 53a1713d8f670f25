//! Validation helpers and parsing utilities for configuration snapshots.

use crate::error::{ConfigError, ConfigResult};
use crate::model::Configuration;

/// Wildcard policy accepting every file type.
pub const ALLOW_ALL_FILE_TYPES: &str = ".*";

/// Accepted range of the persisted log level.
pub const LOG_LEVEL_RANGE: std::ops::RangeInclusive<u8> = 1..=3;

const TZ_OFFSET_MIN: f32 = -12.0;
const TZ_OFFSET_MAX: f32 = 14.0;

/// Check the ranged fields of a resolved snapshot.
///
/// # Errors
///
/// Returns `ConfigError::InvalidField` when the log level or timezone offset
/// falls outside its accepted range.
pub fn validate_snapshot(config: &Configuration) -> ConfigResult<()> {
    if !LOG_LEVEL_RANGE.contains(&config.log_level) {
        return Err(ConfigError::InvalidField {
            field: "log_level",
            value: Some(config.log_level.to_string()),
            reason: "must be between 1 and 3",
        });
    }

    if !config.tz_offset.is_finite()
        || !(TZ_OFFSET_MIN..=TZ_OFFSET_MAX).contains(&config.tz_offset)
    {
        return Err(ConfigError::InvalidField {
            field: "tz_offset",
            value: Some(config.tz_offset.to_string()),
            reason: "must be between -12 and 14 hours",
        });
    }

    Ok(())
}

/// Split a stored file type policy into lower-cased entries.
///
/// Returns `None` for the wildcard policy. Blank entries are discarded, so an
/// empty policy produces an empty list.
#[must_use]
pub fn parse_allowed_file_types(raw: &str) -> Option<Vec<String>> {
    if raw.trim() == ALLOW_ALL_FILE_TYPES {
        return None;
    }

    Some(
        raw.to_lowercase()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Parse a retention grace period in months.
///
/// Any numeric value is accepted and truncated to whole months (`"1.5"` keeps one
/// month). Results below one month are rejected so a purge can never reach
/// entries written this month.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_grace_period(raw: &str) -> Option<u32> {
    let months = raw.trim().parse::<f64>().ok()?.trunc();
    // NaN fails both comparisons.
    (months >= 1.0 && months <= f64::from(u32::MAX)).then_some(months as u32)
}
