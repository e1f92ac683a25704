use crate::config::error::ConfigError;

use std::fmt;
use std::str::FromStr;


/// Scheme prefix of every URL handed to the JDBC connector.
pub const JDBC_URL_PREFIX: &str = "jdbc:postgresql://";

/// Database connection fields decoded from a `[key:value,...]` string.
///
/// The accepted keys are `username`, `password`, `host`, `port` and `dbname`.
/// Entries may appear in any order; unknown keys are ignored, a missing key
/// leaves its field empty and a repeated key keeps the last value. Field
/// values are taken verbatim and are not validated.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub dbname: String,
}

impl ConnectionDescriptor {
    /// Parse `[username:U,password:P,host:H,port:N,dbname:D]`.
    ///
    /// The enclosing brackets are optional and empty entries are skipped.
    /// An entry with no `:` fails with [`ConfigError::MalformedEntry`].
    pub fn parse(raw: &str) -> Result<ConnectionDescriptor, ConfigError> {
        let inner = raw.trim();
        let inner = inner.strip_prefix('[').unwrap_or(inner);
        let inner = inner.strip_suffix(']').unwrap_or(inner);

        let mut descriptor = ConnectionDescriptor::default();

        for (index, entry) in inner.split(',').enumerate() {
            if entry.trim().is_empty() {
                continue;
            }

            let (key, value) = entry.split_once(':')
                .ok_or(ConfigError::MalformedEntry { index })?;

            let field = match key {
                "username" => &mut descriptor.username,
                "password" => &mut descriptor.password,
                "host" => &mut descriptor.host,
                "port" => &mut descriptor.port,
                "dbname" => &mut descriptor.dbname,
                _ => continue,
            };
            *field = value.to_string();
        }

        Ok(descriptor)
    }

    /// `jdbc:postgresql://{host}:{port}/{dbname}`
    pub fn jdbc_url(&self) -> String {
        format!("{JDBC_URL_PREFIX}{}:{}/{}", self.host, self.port, self.dbname)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionDescriptor::parse(s)
    }
}

// Never print the password.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}
