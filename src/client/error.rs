use crate::io::IoError;

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use url;


#[derive(Debug)]
#[non_exhaustive]
pub(crate) struct ClientError {
    pub(crate) kind: ClientErrorKind
}

impl ClientError {
    pub(crate) fn new(kind: ClientErrorKind) -> Self {
        ClientError { kind }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientError: {}", self.kind)
    }
}

impl Error for ClientError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

#[derive(Debug)]
pub(crate) enum ClientErrorKind {
    AddArtifactsRequest { status: tonic::Status, names: Vec<String> },
    ArtifactCrcMismatch { name: String },
    ArtifactRead { source: std::io::Error, path: PathBuf },
    ConfigRequest { status: tonic::Status, keys: Vec<String> },
    ExecutePlanRequest { status: tonic::Status, operation_id: String },
    InvalidSessionID { source: uuid::Error, session_id: String },
    InvalidConnectionString { source: Option<url::ParseError>, conn_string: String,  msg: String },
    InvalidHeader { key: String },
    Io(IoError),
    ReleaseSessionRequest { status: tonic::Status },
    SessionIDMismatch { client_session_id: String, response_session_id: String },
    Stream { status: tonic::Status, operation_id: String },
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddArtifactsRequest { status, names } => write!(
                f, "AddArtifactsRequest failed with status '{status}' for artifacts {names:?}"
            ),
            Self::ArtifactCrcMismatch { name } => write!(
                f, "Server reported a CRC mismatch for artifact '{name}'"
            ),
            Self::ArtifactRead { path, .. } => write!(
                f, "Failed to read artifact '{}'", path.display()
            ),
            Self::ConfigRequest { status, keys } => write!(
                f, "ConfigRequest failed with status '{status}' for keys {keys:?}"
            ),
            Self::ExecutePlanRequest { status, operation_id } => write!(
                f, "ExecutePlanRequest failed with status '{status}' (operation {operation_id})"
            ),
            Self::InvalidSessionID { session_id, .. } => write!(f, "Failed to parse session ID: '{session_id}'"),
            Self::InvalidConnectionString { conn_string, msg, .. } => write!(
                f, "Failed to parse the connection URL '{conn_string}': {msg}. Please update the URL to follow the correct format, e.g., 'sc://hostname:port'."
            ),
            Self::InvalidHeader { key } => write!(f, "Connection parameter '{key}' is not a valid gRPC header"),
            Self::Io(_) => write!(f, "Failed to deserialize Arrow RecordBatch."),
            Self::ReleaseSessionRequest { status } => write!(
                f, "ReleaseSessionRequest failed with status '{status}'"
            ),
            Self::SessionIDMismatch { client_session_id, response_session_id } => write!(
                f, "Response session ID does not match the client: {client_session_id} != {response_session_id}"
            ),
            Self::Stream { status, operation_id } => write!(
                f, "Failed to process stream of operation {operation_id}: status {status}"
            ),
        }
    }
}

impl Error for ClientErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::ArtifactRead { source, .. } => Some(source),
			Self::InvalidSessionID { source, .. } => Some(source),
			Self::InvalidConnectionString { source, .. } => match source {
                Some(src) => Some(src),
                None => None
            },
			Self::Io(source) => Some(source),
			_ => None,
		}
	}
}

impl From<IoError> for ClientError {
    fn from(error: IoError) -> Self {
        ClientError::new(ClientErrorKind::Io(error))
    }
}
