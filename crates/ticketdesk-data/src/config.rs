//! Configuration profiles stored in `ticketdesk_config`.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use ticketdesk_config::{ConfigError, ConfigId, ConfigResult, ConfigStore, Configuration, EmailAccount};

use crate::error::{DataError, Result, map_query_err};

const SELECT_CONFIG: &str = r"
    SELECT c.id,
           c.schema_version,
           c.schema_signature,
           c.helpdesk_online,
           c.admin_email,
           c.allowed_file_types,
           c.max_file_size,
           c.log_level,
           c.log_grace_period,
           c.alert_on_sql_error,
           c.tz_offset,
           c.observe_dst,
           a.id AS alert_id,
           a.address AS alert_address,
           a.name AS alert_name,
           d.id AS default_id,
           d.address AS default_address,
           d.name AS default_name
    FROM ticketdesk_config c
    LEFT JOIN ticketdesk_email a ON a.id = c.alert_email_id
    LEFT JOIN ticketdesk_email d ON d.id = c.default_email_id
    WHERE c.id = $1
";

/// Raw projection of a profile joined with its sender accounts.
#[derive(Debug, Clone, FromRow)]
pub struct ConfigRow {
    /// Profile identifier.
    pub id: i32,
    /// Schema version; null for legacy installs.
    pub schema_version: Option<i32>,
    /// Stored schema signature.
    pub schema_signature: String,
    /// Online flag.
    pub helpdesk_online: bool,
    /// Administrator address.
    pub admin_email: Option<String>,
    /// Raw file type policy.
    pub allowed_file_types: Option<String>,
    /// Maximum upload size in bytes.
    pub max_file_size: i64,
    /// Persisted log level.
    pub log_level: i16,
    /// Raw retention period.
    pub log_grace_period: Option<String>,
    /// Alert on SQL errors.
    pub alert_on_sql_error: bool,
    /// Timezone offset in hours.
    pub tz_offset: f32,
    /// Daylight saving flag.
    pub observe_dst: bool,
    /// Alert account identifier.
    pub alert_id: Option<i32>,
    /// Alert account address.
    pub alert_address: Option<String>,
    /// Alert account display name.
    pub alert_name: Option<String>,
    /// Default account identifier.
    pub default_id: Option<i32>,
    /// Default account address.
    pub default_address: Option<String>,
    /// Default account display name.
    pub default_name: Option<String>,
}

impl TryFrom<ConfigRow> for Configuration {
    type Error = DataError;

    fn try_from(row: ConfigRow) -> Result<Self> {
        Ok(Self {
            id: non_negative("id", row.id.into())?,
            schema_version: row
                .schema_version
                .map(|version| non_negative("schema_version", version.into()))
                .transpose()?,
            schema_signature: row.schema_signature,
            helpdesk_online: row.helpdesk_online,
            admin_email: row.admin_email,
            alert_email: account(row.alert_id, row.alert_address, row.alert_name)?,
            default_email: account(row.default_id, row.default_address, row.default_name)?,
            allowed_file_types: row.allowed_file_types,
            max_file_size: u64::try_from(row.max_file_size).map_err(|_| DataError::OutOfRange {
                field: "max_file_size",
                value: row.max_file_size,
            })?,
            log_level: u8::try_from(row.log_level).map_err(|_| DataError::OutOfRange {
                field: "log_level",
                value: row.log_level.into(),
            })?,
            log_grace_period: row.log_grace_period,
            alert_on_sql_error: row.alert_on_sql_error,
            tz_offset: row.tz_offset,
            observe_dst: row.observe_dst,
        })
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| DataError::OutOfRange { field, value })
}

fn account(
    id: Option<i32>,
    address: Option<String>,
    name: Option<String>,
) -> Result<Option<EmailAccount>> {
    let (Some(id), Some(address)) = (id, address) else {
        return Ok(None);
    };
    Ok(Some(EmailAccount {
        id: non_negative("email_id", id.into())?,
        address,
        name,
    }))
}

/// Configuration backend reading `ticketdesk_config`.
#[derive(Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch and convert the profile stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a column is out of range.
    pub async fn fetch(&self, id: ConfigId) -> Result<Option<Configuration>> {
        let Ok(id) = i32::try_from(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, ConfigRow>(SELECT_CONFIG)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("lookup_config"))?;
        row.map(Configuration::try_from).transpose()
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn lookup(&self, id: ConfigId) -> ConfigResult<Option<Configuration>> {
        self.fetch(id)
            .await
            .map_err(|err| ConfigError::backend("lookup", err))
    }
}
