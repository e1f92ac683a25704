//! Lazily evaluated datasets and the data-source reader/writer that produce and persist them.

use crate::error::SparkError;
use crate::session::SparkSession;
use crate::spark;
use crate::spark::write_operation;

use arrow::array::RecordBatch;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;


/// How a write treats an existing destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveMode {
    Append,
    Overwrite,
    #[default]
    ErrorIfExists,
    Ignore,
}

impl From<SaveMode> for write_operation::SaveMode {
    fn from(mode: SaveMode) -> Self {
        match mode {
            SaveMode::Append => write_operation::SaveMode::Append,
            SaveMode::Overwrite => write_operation::SaveMode::Overwrite,
            SaveMode::ErrorIfExists => write_operation::SaveMode::ErrorIfExists,
            SaveMode::Ignore => write_operation::SaveMode::Ignore,
        }
    }
}

/// Loads a [`DataFrame`] through a data source such as `jdbc`.
#[derive(Clone)]
pub struct DataFrameReader {
    session: SparkSession,
    format: Option<String>,
    options: HashMap<String, String>,
}

impl DataFrameReader {
    pub(crate) fn new(session: SparkSession) -> Self {
        DataFrameReader { session, format: None, options: HashMap::new() }
    }

    pub fn format(mut self, source: &str) -> Self {
        self.format = Some(source.to_string());
        self
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn options<'a, I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.options.extend(options.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// Nothing is sent to the server until the frame is written or collected.
    pub fn load(self) -> DataFrame {
        let relation = spark::Relation {
            rel_type: Some(spark::relation::RelType::Read(spark::Read {
                read_type: Some(spark::read::ReadType::DataSource(spark::read::DataSource {
                    format: self.format,
                    schema: None,
                    options: self.options,
                    paths: vec![],
                    predicates: vec![],
                })),
                is_streaming: false,
            })),
        };

        DataFrame { session: self.session, relation }
    }
}

/// A relation bound to a session; the engine evaluates it on demand.
#[derive(Clone)]
pub struct DataFrame {
    session: SparkSession,
    relation: spark::Relation,
}

impl DataFrame {
    pub fn relation(&self) -> &spark::Relation {
        &self.relation
    }

    pub fn write(&self) -> DataFrameWriter {
        DataFrameWriter {
            session: self.session.clone(),
            input: self.relation.clone(),
            source: None,
            mode: SaveMode::default(),
            options: HashMap::new(),
        }
    }

    /// Execute the relation and return its rows.
    pub async fn collect(&self) -> Result<Vec<RecordBatch>, SparkError> {
        let plan = spark::Plan {
            op_type: Some(spark::plan::OpType::Root(self.relation.clone())),
        };

        let result = self.session.execute(plan).await?;

        Ok(result.batches)
    }
}

/// Persists a [`DataFrame`] through a data source.
#[derive(Clone)]
pub struct DataFrameWriter {
    session: SparkSession,
    input: spark::Relation,
    source: Option<String>,
    mode: SaveMode,
    options: HashMap<String, String>,
}

impl DataFrameWriter {
    pub fn format(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn options<'a, I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.options.extend(options.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub(crate) fn command(&self) -> spark::Command {
        let write = spark::WriteOperation {
            input: Some(self.input.clone()),
            source: self.source.clone(),
            mode: write_operation::SaveMode::from(self.mode) as i32,
            options: self.options.clone(),
        };

        spark::Command {
            command_type: Some(spark::command::CommandType::WriteOperation(write)),
        }
    }

    pub async fn save(self) -> Result<(), SparkError> {
        let plan = spark::Plan {
            op_type: Some(spark::plan::OpType::Command(self.command())),
        };

        let result = self.session.execute(plan).await?;
        debug!(operation_id = %result.operation_id, mode = ?self.mode, "write finished");

        Ok(())
    }
}

/// Data source options with credentials masked, sorted for stable output.
fn redacted(options: &HashMap<String, String>) -> BTreeMap<&str, &str> {
    options
        .iter()
        .map(|(key, value)| {
            let value = if key.eq_ignore_ascii_case("password") { "<redacted>" } else { value.as_str() };
            (key.as_str(), value)
        })
        .collect()
}

impl fmt::Debug for DataFrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrameReader")
            .field("session", &self.session)
            .field("format", &self.format)
            .field("options", &redacted(&self.options))
            .finish()
    }
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DataFrame");
        debug.field("session", &self.session);

        if let Some(spark::relation::RelType::Read(spark::Read {
            read_type: Some(spark::read::ReadType::DataSource(source)),
            ..
        })) = &self.relation.rel_type
        {
            debug
                .field("format", &source.format)
                .field("options", &redacted(&source.options));
        }

        debug.finish_non_exhaustive()
    }
}

impl fmt::Debug for DataFrameWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrameWriter")
            .field("session", &self.session)
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("options", &redacted(&self.options))
            .finish_non_exhaustive()
    }
}
