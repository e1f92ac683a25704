//! Decoding of the Arrow IPC payloads carried by `ExecutePlanResponse.ArrowBatch`.

use arrow::array::RecordBatch;
use arrow::ipc::reader::StreamReader;
use std::error::Error;
use std::fmt;


#[derive(Debug)]
pub(crate) enum IoError {
    Arrow(arrow::error::ArrowError),
    RowCount { expected: i64, got: i64 }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrow(_) => write!(f, "IoError: ArrowError"),
            Self::RowCount { expected, got } => write!(f, "IoError: Expected {expected} rows in arrow batch but got {got}.")
        }
    }
}

impl Error for IoError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Arrow(source) => Some(source),
			_ => None,
		}
	}
}

impl From<arrow::error::ArrowError> for IoError {
    fn from(error: arrow::error::ArrowError) -> Self {
        IoError::Arrow(error)
    }
}

/// Decode one Arrow IPC stream whose batches must add up to `row_count` rows.
pub(crate) fn deserialize(stream: &[u8], row_count: i64) -> Result<Vec<RecordBatch>, IoError> {
    let reader = StreamReader::try_new(stream, None)?;

    let mut batches: Vec<RecordBatch> = vec![];
    let mut total_count: i64 = 0;

    for batch in reader {
        let record = batch?;
        total_count += record.num_rows() as i64;
        batches.push(record);
    }

    if total_count != row_count {
        return Err(IoError::RowCount { expected: row_count, got: total_count });
    }

    Ok(batches)
}
