use crate::client::error::{ClientError, ClientErrorKind};
use crate::spark;

use std::collections::HashMap;
use std::env;
use url::Url;
use uuid::Uuid;

const DEFAULT_USER_AGENT: &str = "_SPARK_JDBC_STEP";

/// A parsed Spark Connect remote: `sc://<host>:<port>/;key1=value1;key2=value2`.
///
/// Recognized parameters:
/// - token: sent as `authorization: Bearer <token>`;
/// - user_id: user reported to the server (defaults to $USER);
/// - user_agent: prefix of the client type string;
/// - session_id: UUID of an existing session to reuse;
/// - use_ssl: `true` enables TLS (requires the `tls` feature).
///
/// Every other parameter becomes a gRPC metadata header.
#[derive(Clone, Debug)]
pub(crate) struct ChannelBuilder {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) session_id: Uuid,
    pub(crate) user_id: Option<String>,
    pub(crate) user_agent: String,
    pub(crate) use_ssl: bool,
    pub(crate) headers: HashMap<String, String>,
}

impl ChannelBuilder {
    pub(crate) fn new(remote: &str) -> Result<ChannelBuilder, ClientError> {
        let invalid = |msg: &str, source: Option<url::ParseError>| {
            ClientError::new(ClientErrorKind::InvalidConnectionString {
                source,
                conn_string: remote.to_string(),
                msg: msg.to_string(),
            })
        };

        let url = Url::parse(remote)
            .map_err(|source| invalid("failed to parse connection string", Some(source)))?;

        if url.scheme() != "sc" {
            return Err(invalid("the connection string must start with 'sc://'", None));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("the hostname must not be empty", None))?
            .to_string();

        let port = url
            .port()
            .ok_or_else(|| invalid("the port must not be empty", None))?;

        let mut builder = ChannelBuilder {
            host,
            port,
            session_id: Uuid::new_v4(),
            user_id: env::var("USER").ok(),
            user_agent: user_agent(DEFAULT_USER_AGENT),
            use_ssl: false,
            headers: HashMap::new(),
        };

        for (key, value) in parameters(url.path()) {
            match key {
                "token" => {
                    builder.headers.insert("authorization".to_string(), format!("Bearer {value}"));
                }
                "user_id" => builder.user_id = Some(value.to_string()),
                "user_agent" => builder.user_agent = user_agent(value),
                "session_id" => {
                    builder.session_id = Uuid::parse_str(value).map_err(|source| {
                        ClientError::new(ClientErrorKind::InvalidSessionID {
                            source,
                            session_id: value.to_string(),
                        })
                    })?;
                }
                "use_ssl" => builder.use_ssl = value.eq_ignore_ascii_case("true"),
                _ => {
                    builder.headers.insert(key.to_string(), value.to_string());
                }
            }
        }

        if builder.use_ssl && !cfg!(feature = "tls") {
            return Err(invalid("the 'use_ssl' option requires the 'tls' feature", None));
        }

        Ok(builder)
    }

    pub(crate) fn endpoint(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };

        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub(crate) fn user_context(&self) -> spark::UserContext {
        let user = self.user_id.clone().unwrap_or_default();

        spark::UserContext { user_id: user.clone(), user_name: user }
    }
}

/// `key=value` pairs after the first `;` of the remote's path.
fn parameters(path: &str) -> impl Iterator<Item = (&str, &str)> {
    path.split(';')
        .skip(1)
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

fn user_agent(name: &str) -> String {
    format!(
        "{name} os/{} spark_jdbc_step/{}",
        env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
}
