//! Spark Connect job step that copies a PostgreSQL query result into a table.
//!
//! The step reads its database coordinates from `DBCONNECTION`, opens a Spark
//! Connect session with the PostgreSQL JDBC driver on the classpath, loads
//! `select count(*) from pg_catalog.pg_tables` through Spark's JDBC data source
//! and writes the result to `results_proc`.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use spark_jdbc_step::config::JobConfig;
//!
//! let config = JobConfig::from_env()?;
//! let summary = spark_jdbc_step::job::run(&config).await?;
//! println!("wrote {} in {:?}", summary.target_table, summary.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataframe;
pub mod error;
pub mod job;
pub mod session;

mod client;
mod io;
#[cfg(test)]
mod testing;

/// Generated Spark Connect protocol types.
pub mod spark {
    tonic::include_proto!("spark.connect");
}

pub use dataframe::{DataFrame, DataFrameReader, DataFrameWriter, SaveMode};
pub use error::{JobError, SparkError};
pub use session::{SparkSession, SparkSessionBuilder};
