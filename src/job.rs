//! The job step: read a query result over JDBC, transform it, write it to a table.
//!
//! The compute session is acquired once per run and released once, on success
//! and on every failure after acquisition.

use crate::config::{JdbcOptions, JobConfig};
use crate::dataframe::{DataFrame, SaveMode};
use crate::error::{JobError, SparkError};
use crate::session::{SparkSession, SparkSessionBuilder};

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};


/// The engine operations a job run needs.
#[allow(async_fn_in_trait)]
pub trait ComputeSession: Sized {
    type Dataset;

    fn session_id(&self) -> String;

    /// Lazily load the result of `query` from the database behind `options`.
    async fn read_jdbc(&self, options: &JdbcOptions, query: &str) -> Result<Self::Dataset, SparkError>;

    /// Create `table` from `dataset`; fails if the table already exists.
    async fn write_jdbc(&self, dataset: Self::Dataset, options: &JdbcOptions, table: &str) -> Result<(), SparkError>;

    async fn stop(self) -> Result<(), SparkError>;
}

impl ComputeSession for SparkSession {
    type Dataset = DataFrame;

    fn session_id(&self) -> String {
        SparkSession::session_id(self)
    }

    async fn read_jdbc(&self, options: &JdbcOptions, query: &str) -> Result<DataFrame, SparkError> {
        Ok(self
            .read()
            .format("jdbc")
            .options(options.pairs())
            .option("query", query)
            .load())
    }

    async fn write_jdbc(&self, dataset: DataFrame, options: &JdbcOptions, table: &str) -> Result<(), SparkError> {
        dataset
            .write()
            .format("jdbc")
            .options(options.pairs())
            .option("dbtable", table)
            .mode(SaveMode::ErrorIfExists)
            .save()
            .await
    }

    async fn stop(self) -> Result<(), SparkError> {
        SparkSession::stop(self).await
    }
}

/// What a finished run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSummary {
    pub session_id: String,
    pub source_query: String,
    pub target_table: String,
    pub elapsed: Duration,
}

/// Processing between read and write. Currently passes the dataset through.
pub fn transform<D>(dataset: D) -> D {
    dataset
}

/// Start the Spark Connect session for `config`: driver on the classpath, fixed app name.
pub async fn open_session(config: &JobConfig) -> Result<SparkSession, SparkError> {
    let driver_jar = config.driver_jar.display().to_string();

    SparkSessionBuilder::new(&config.spark_remote)
        .config("spark.driver.extraClassPath", driver_jar)
        .app_name(config.app_name.as_str())
        .add_jar(&config.driver_jar)
        .build()
        .await
}

/// Run the job step against a Spark Connect server.
pub async fn run(config: &JobConfig) -> Result<JobSummary, JobError> {
    run_with(config, open_session).await
}

/// Run the job step on a session produced by `open`.
///
/// `open` is called exactly once. Once it succeeds, the session is stopped
/// exactly once whatever happens next; if both the pipeline and the stop fail,
/// the pipeline error wins and the stop error is logged.
pub async fn run_with<'a, S, F, Fut>(config: &'a JobConfig, open: F) -> Result<JobSummary, JobError>
where
    S: ComputeSession,
    F: FnOnce(&'a JobConfig) -> Fut,
    Fut: Future<Output = Result<S, SparkError>>,
{
    let started = Instant::now();

    info!(
        remote = %config.spark_remote,
        host = %config.connection.host,
        dbname = %config.connection.dbname,
        app_name = %config.app_name,
        "opening compute session"
    );

    let session = open(config).await?;
    let session_id = session.session_id();

    let outcome = process(&session, config).await;
    let released = session.stop().await;

    match (outcome, released) {
        (Ok(()), Ok(())) => Ok(JobSummary {
            session_id,
            source_query: config.source_query.clone(),
            target_table: config.target_table.clone(),
            elapsed: started.elapsed(),
        }),
        (Ok(()), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(%session_id, error = %release_err, "failed to release compute session");
            Err(err)
        }
    }
}

async fn process<S: ComputeSession>(session: &S, config: &JobConfig) -> Result<(), JobError> {
    let options = config.jdbc_options();

    let dataset = session.read_jdbc(&options, &config.source_query).await?;
    info!(query = %config.source_query, url = %options.url, "source dataset loaded");

    let dataset = transform(dataset);

    session.write_jdbc(dataset, &options, &config.target_table).await?;
    info!(table = %config.target_table, "dataset written");

    Ok(())
}
