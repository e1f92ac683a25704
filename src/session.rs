//! Spark Connect sessions.

use crate::client::{Artifact, ChannelBuilder, ExecutionResult, SparkClient};
use crate::dataframe::DataFrameReader;
use crate::error::{SparkError, SparkErrorKind};
use crate::spark;

use std::fmt;
use std::path::PathBuf;
#[cfg(feature = "tls")]
use tonic::transport::ClientTlsConfig;
use tonic::transport::Channel;
use tracing::{debug, info, warn};


/// Builds a [`SparkSession`] against a Spark Connect remote.
///
/// ```no_run
/// # async fn example() -> Result<(), spark_jdbc_step::error::SparkError> {
/// use spark_jdbc_step::session::SparkSessionBuilder;
///
/// let session = SparkSessionBuilder::new("sc://localhost:15002")
///     .config("spark.driver.extraClassPath", "/opt/driver.jar")
///     .app_name("Connecting to PostgreSQL")
///     .add_jar("/opt/driver.jar")
///     .build()
///     .await?;
/// session.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SparkSessionBuilder {
    connection: String,
    configs: Vec<(String, String)>,
    jars: Vec<PathBuf>,
}

impl SparkSessionBuilder {
    pub fn new(connection: &str) -> Self {
        SparkSessionBuilder {
            connection: connection.to_string(),
            configs: vec![],
            jars: vec![],
        }
    }

    /// Set a session configuration value. Setting a key again replaces it.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.configs.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.configs.push((key, value)),
        }
        self
    }

    pub fn app_name(self, name: impl Into<String>) -> Self {
        self.config("spark.app.name", name)
    }

    /// Upload a local jar into the session's classpath when the session starts.
    pub fn add_jar(mut self, path: impl Into<PathBuf>) -> Self {
        self.jars.push(path.into());
        self
    }

    /// Configuration applied when the session starts, in insertion order.
    pub fn configs(&self) -> &[(String, String)] {
        &self.configs
    }

    /// Connect, apply configuration and upload jars.
    ///
    /// Jars are read before anything is sent, so a missing jar fails without
    /// touching the server. If a later step fails, the server-side session is
    /// released before the error is returned.
    pub async fn build(self) -> Result<SparkSession, SparkError> {
        let channel_builder = ChannelBuilder::new(&self.connection)?;

        let artifacts = self.jars
            .iter()
            .map(|path| Artifact::jar(path))
            .collect::<Result<Vec<_>, _>>()?;

        let channel = connect(&channel_builder).await?;
        let client = SparkClient::new(channel, channel_builder)?;
        let session = SparkSession { client };

        if let Err(err) = session.initialize(&self.configs, artifacts).await {
            if let Err(release_err) = session.client.release_session().await {
                warn!(session_id = %session.session_id(), error = %release_err, "failed to release session after setup error");
            }
            return Err(err);
        }

        info!(session_id = %session.session_id(), "spark session started");

        Ok(session)
    }
}

async fn connect(builder: &ChannelBuilder) -> Result<Channel, SparkError> {
    let uri = builder.endpoint();
    let parsed: http::Uri = uri
        .parse()
        .map_err(|source| SparkError::new(SparkErrorKind::InvalidConnectionUri { source, uri: uri.clone() }))?;

    #[allow(unused_mut)]
    let mut endpoint = Channel::builder(parsed);

    #[cfg(feature = "tls")]
    if builder.use_ssl {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|err| SparkError::new(SparkErrorKind::Transport(err)))?;
    }

    debug!(%uri, "connecting to spark connect server");

    endpoint
        .connect()
        .await
        .map_err(|err| SparkError::new(SparkErrorKind::Transport(err)))
}

/// A handle on a server-side Spark Connect session.
///
/// Cloning is cheap and every clone talks to the same session.
#[derive(Clone)]
pub struct SparkSession {
    pub(crate) client: SparkClient,
}

impl SparkSession {
    pub fn builder(connection: &str) -> SparkSessionBuilder {
        SparkSessionBuilder::new(connection)
    }

    pub fn session_id(&self) -> String {
        self.client.session_id()
    }

    pub fn read(&self) -> DataFrameReader {
        DataFrameReader::new(self.clone())
    }

    pub(crate) async fn execute(&self, plan: spark::Plan) -> Result<ExecutionResult, SparkError> {
        Ok(self.client.execute_plan(plan).await?)
    }

    /// Release the server-side session.
    pub async fn stop(self) -> Result<(), SparkError> {
        self.client.release_session().await?;
        info!(session_id = %self.session_id(), "spark session released");
        Ok(())
    }

    async fn initialize(&self, configs: &[(String, String)], artifacts: Vec<Artifact>) -> Result<(), SparkError> {
        let (launch_time, runtime): (Vec<_>, Vec<_>) = configs
            .iter()
            .cloned()
            .partition(|(key, _)| is_launch_time(key));

        if !runtime.is_empty() {
            let warnings = self.client.set_config(&runtime).await?;
            self.log_config_warnings(warnings);
        }

        if !artifacts.is_empty() {
            self.client.add_artifacts(artifacts).await?;
        }

        // Older servers refuse core settings once the driver is up; jars arrive as artifacts anyway.
        if !launch_time.is_empty() {
            match self.client.set_config(&launch_time).await {
                Ok(warnings) => self.log_config_warnings(warnings),
                Err(err) => warn!(
                    session_id = %self.session_id(),
                    error = %err,
                    "server refused launch-time configuration"
                ),
            }
        }

        Ok(())
    }

    fn log_config_warnings(&self, warnings: Vec<String>) {
        for warning in warnings {
            warn!(session_id = %self.session_id(), %warning, "spark config warning");
        }
    }
}

/// Settings the driver reads at startup and a running server may refuse to change.
const LAUNCH_TIME_PREFIXES: &[&str] = &[
    "spark.app.name",
    "spark.driver.",
    "spark.executor.",
    "spark.jars",
    "spark.master",
    "spark.submit.",
];

fn is_launch_time(key: &str) -> bool {
    LAUNCH_TIME_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

impl fmt::Debug for SparkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparkSession")
            .field("session_id", &self.session_id())
            .finish()
    }
}

/// Session over a channel that never connects until first used.
#[cfg(test)]
pub(crate) fn lazy_session() -> SparkSession {
    let builder = ChannelBuilder::new(crate::config::DEFAULT_SPARK_REMOTE).unwrap();
    let channel = Channel::from_static("http://localhost:15002").connect_lazy();

    SparkSession { client: SparkClient::new(channel, builder).unwrap() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientErrorKind;
    use crate::testing::{temp_jar, Behavior, StubServer};

    fn client_kind(err: SparkError) -> ClientErrorKind {
        match err.kind {
            SparkErrorKind::Client(client) => client.kind,
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_builder_collects_configs() {
        let builder = SparkSessionBuilder::new("sc://localhost:15002")
            .config("spark.driver.extraClassPath", "/opt/a.jar")
            .app_name("first")
            .app_name("Connecting to PostgreSQL")
            .config("spark.driver.extraClassPath", "/opt/b.jar");

        assert_eq!(builder.configs(), &[
            ("spark.driver.extraClassPath".to_string(), "/opt/b.jar".to_string()),
            ("spark.app.name".to_string(), "Connecting to PostgreSQL".to_string()),
        ]);
    }

    #[test]
    fn test_build_fails_on_invalid_remote() {
        let err = tokio_test::block_on(SparkSessionBuilder::new("http://localhost:15002").build())
            .unwrap_err();

        match err.kind {
            SparkErrorKind::Client(client) => {
                assert!(matches!(client.kind, ClientErrorKind::InvalidConnectionString { .. }));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_build_fails_on_missing_jar_before_connecting() {
        // Nothing listens on port 1; the jar check must fail first.
        let err = tokio_test::block_on(
            SparkSessionBuilder::new("sc://127.0.0.1:1")
                .add_jar("/nonexistent/postgresql-42.6.0.jar")
                .build()
        ).unwrap_err();

        match err.kind {
            SparkErrorKind::Client(client) => {
                assert!(matches!(client.kind, ClientErrorKind::ArtifactRead { .. }));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_session_debug_shows_session_id() {
        tokio_test::block_on(async {
            let session = lazy_session();
            let rendered = format!("{session:?}");

            assert!(rendered.contains(&session.session_id()));
        });
    }

    #[test]
    fn test_launch_time_keys() {
        assert!(is_launch_time("spark.driver.extraClassPath"));
        assert!(is_launch_time("spark.app.name"));
        assert!(is_launch_time("spark.jars.packages"));
        assert!(!is_launch_time("spark.sql.shuffle.partitions"));
    }

    #[tokio::test]
    async fn test_build_applies_config_and_uploads_jar() {
        let server = StubServer::start(Behavior::default()).await;
        let jar = temp_jar(1024);

        let session = SparkSessionBuilder::new(&server.remote)
            .config("spark.sql.shuffle.partitions", "4")
            .config("spark.driver.extraClassPath", jar.display().to_string())
            .app_name("Connecting to PostgreSQL")
            .add_jar(&jar)
            .build()
            .await
            .unwrap();
        std::fs::remove_file(&jar).unwrap();

        {
            let calls = server.calls();
            let file_name = jar.file_name().unwrap().to_string_lossy();
            assert_eq!(calls.artifacts, vec![format!("jars/{file_name}")]);
            assert_eq!(calls.config_keys, vec![
                vec!["spark.sql.shuffle.partitions".to_string()],
                vec!["spark.driver.extraClassPath".to_string(), "spark.app.name".to_string()],
            ]);
            assert_eq!(calls.releases, 0);
        }

        session.stop().await.unwrap();
        assert_eq!(server.calls().releases, 1);
    }

    #[tokio::test]
    async fn test_refused_runtime_config_releases_session_once() {
        let server = StubServer::start(Behavior {
            refused_keys: vec!["spark.sql.shuffle.partitions"],
            ..Default::default()
        }).await;

        let err = SparkSessionBuilder::new(&server.remote)
            .config("spark.sql.shuffle.partitions", "4")
            .build()
            .await
            .unwrap_err();

        match client_kind(err) {
            ClientErrorKind::ConfigRequest { status, keys } => {
                assert_eq!(status.code(), tonic::Code::FailedPrecondition);
                assert_eq!(keys, vec!["spark.sql.shuffle.partitions".to_string()]);
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
        assert_eq!(server.calls().releases, 1);
    }

    #[tokio::test]
    async fn test_refused_launch_time_config_only_warns() {
        let server = StubServer::start(Behavior {
            refused_keys: vec!["spark.driver.extraClassPath", "spark.app.name"],
            ..Default::default()
        }).await;

        let session = SparkSessionBuilder::new(&server.remote)
            .config("spark.driver.extraClassPath", "/opt/driver.jar")
            .app_name("Connecting to PostgreSQL")
            .build()
            .await
            .unwrap();

        assert_eq!(server.calls().config_keys.len(), 1);
        assert_eq!(server.calls().releases, 0);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_crc_mismatch_releases_session_once() {
        let server = StubServer::start(Behavior { corrupt_artifacts: true, ..Default::default() }).await;
        let jar = temp_jar(1024);

        let err = SparkSessionBuilder::new(&server.remote)
            .add_jar(&jar)
            .build()
            .await
            .unwrap_err();
        std::fs::remove_file(&jar).unwrap();

        let file_name = jar.file_name().unwrap().to_string_lossy();
        match client_kind(err) {
            ClientErrorKind::ArtifactCrcMismatch { name } => assert_eq!(name, format!("jars/{file_name}")),
            other => panic!("unexpected error kind: {other:?}"),
        }
        assert_eq!(server.calls().releases, 1);
    }
}
