//! spark-jdbc-step: copy a PostgreSQL query result into `results_proc` through Spark.
//!
//! Configuration comes from the environment only:
//! - `DBCONNECTION` (required): `[username:U,password:P,host:H,port:N,dbname:D]`
//! - `SPARK_REMOTE` (optional): Spark Connect remote, default `sc://localhost:15002`
//! - `RUST_LOG` (optional): log filter, default `warn,spark_jdbc_step=info`

use anyhow::Context;
use spark_jdbc_step::config::JobConfig;
use spark_jdbc_step::job;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The step's own progress at `info`; gRPC and HTTP/2 internals only when they go wrong.
const DEFAULT_LOG_FILTER: &str = "warn,spark_jdbc_step=info";

/// Filter from `RUST_LOG`, or the step default when it is unset or does not parse.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .init();

    let config = JobConfig::from_env().context("failed to read job configuration")?;

    let summary = job::run(&config).await.context("job step failed")?;

    info!(
        session_id = %summary.session_id,
        table = %summary.target_table,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "job step finished"
    );

    Ok(())
}
