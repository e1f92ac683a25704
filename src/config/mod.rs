//! Job configuration, read once from the environment at startup.

mod connection;
mod error;

pub use connection::{ConnectionDescriptor, JDBC_URL_PREFIX};
pub use error::ConfigError;

use std::env;
use std::path::PathBuf;


/// Environment variable holding the `[key:value,...]` connection string.
pub const DBCONNECTION_VAR: &str = "DBCONNECTION";
/// Environment variable holding the Spark Connect remote.
pub const SPARK_REMOTE_VAR: &str = "SPARK_REMOTE";

pub const DEFAULT_SPARK_REMOTE: &str = "sc://localhost:15002";
pub const DRIVER_JAR_PATH: &str = "/opt/spark/postgresql/driver/postgresql-42.6.0.jar";
pub const DRIVER_CLASS: &str = "org.postgresql.Driver";
pub const APP_NAME: &str = "Connecting to PostgreSQL";
pub const SOURCE_QUERY: &str = "select count(*) from pg_catalog.pg_tables";
pub const TARGET_TABLE: &str = "results_proc";

/// Everything a job run needs, constructed once and passed into [`crate::job::run`].
#[derive(Clone, Debug)]
pub struct JobConfig {
    pub connection: ConnectionDescriptor,
    pub spark_remote: String,
    pub driver_jar: PathBuf,
    pub driver_class: String,
    pub app_name: String,
    pub source_query: String,
    pub target_table: String,
}

impl JobConfig {
    /// Build the config from the process environment.
    pub fn from_env() -> Result<JobConfig, ConfigError> {
        JobConfig::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    ///
    /// `DBCONNECTION` is required; `SPARK_REMOTE` falls back to `sc://localhost:15002`.
    pub fn from_lookup<F>(lookup: F) -> Result<JobConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(DBCONNECTION_VAR)
            .ok_or(ConfigError::MissingVariable { name: DBCONNECTION_VAR })?;
        let connection = ConnectionDescriptor::parse(&raw)?;

        let spark_remote = lookup(SPARK_REMOTE_VAR)
            .unwrap_or_else(|| DEFAULT_SPARK_REMOTE.to_string());

        Ok(JobConfig {
            connection,
            spark_remote,
            driver_jar: PathBuf::from(DRIVER_JAR_PATH),
            driver_class: DRIVER_CLASS.to_string(),
            app_name: APP_NAME.to_string(),
            source_query: SOURCE_QUERY.to_string(),
            target_table: TARGET_TABLE.to_string(),
        })
    }

    /// Options shared by the JDBC reader and writer.
    pub fn jdbc_options(&self) -> JdbcOptions {
        JdbcOptions {
            url: self.connection.jdbc_url(),
            driver: self.driver_class.clone(),
            user: self.connection.username.clone(),
            password: self.connection.password.clone(),
        }
    }
}

/// Connection options understood by Spark's JDBC data source.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcOptions {
    pub url: String,
    pub driver: String,
    pub user: String,
    pub password: String,
}

impl JdbcOptions {
    /// Key/value pairs in the form the data source expects.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("url", self.url.as_str()),
            ("driver", self.driver.as_str()),
            ("user", self.user.as_str()),
            ("password", self.password.as_str()),
        ]
    }
}

impl std::fmt::Debug for JdbcOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdbcOptions")
            .field("url", &self.url)
            .field("driver", &self.driver)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
