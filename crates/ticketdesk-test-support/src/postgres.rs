//! Throwaway databases carved out of a server named by the environment.
//!
//! Suites call [`start_postgres`] and skip when it fails, so a machine without
//! `TICKETDESK_TEST_DATABASE_URL` still runs the rest of the workspace tests.

use std::str::FromStr;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use postgres::NoTls;
use url::Url;

/// Environment variable naming the server used for integration tests.
pub const DATABASE_URL_ENV: &str = "TICKETDESK_TEST_DATABASE_URL";

/// A database created for one test; dropped again when the handle goes away.
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    name: String,
}

impl TestDatabase {
    /// URL of the created database, suitable for `sqlx`.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Name of the created database.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name);
        let _ = run_admin(&self.admin_url, statement);
    }
}

/// Create a uniquely named database on the server named by [`DATABASE_URL_ENV`].
///
/// # Errors
///
/// Returns an error when the variable is unset, the URL is invalid, or the
/// server refuses the `CREATE DATABASE`.
pub fn start_postgres() -> Result<TestDatabase> {
    let base = std::env::var(DATABASE_URL_ENV)
        .with_context(|| format!("{DATABASE_URL_ENV} is not set"))?;
    create_unique_database(&base)
}

fn create_unique_database(base: &str) -> Result<TestDatabase> {
    let parsed = Url::parse(base).context("invalid postgres connection url")?;
    let name = unique_database_name();

    let mut admin = parsed.clone();
    admin.set_path("/postgres");
    let mut target = parsed;
    target.set_path(&format!("/{name}"));

    run_admin(admin.as_str(), format!("CREATE DATABASE \"{name}\""))
        .context("failed to create test database")?;

    Ok(TestDatabase {
        connection_string: target.to_string(),
        admin_url: admin.to_string(),
        name,
    })
}

// The sync client spins up its own runtime, so keep it off the caller's thread.
fn run_admin(admin_url: &str, statement: String) -> Result<()> {
    let admin_url = admin_url.to_string();
    thread::spawn(move || -> Result<()> {
        let mut client = postgres::Config::from_str(&admin_url)?.connect(NoTls)?;
        client.simple_query(&statement)?;
        Ok(())
    })
    .join()
    .map_err(|_| anyhow!("postgres admin thread panicked"))?
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("ticketdesk_test_{}_{nanos}", std::process::id())
}
