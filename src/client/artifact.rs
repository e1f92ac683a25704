use crate::client::error::{ClientError, ClientErrorKind};
use crate::spark::add_artifacts_request::{
    ArtifactChunk, Batch, BeginChunkedArtifact, Payload, SingleChunkArtifact,
};

use std::fs;
use std::path::Path;

/// Artifacts larger than this are streamed as a chunked upload.
pub(crate) const CHUNK_SIZE: usize = 32 * 1024;

/// A local file to be added to the server-side session, e.g. a JDBC driver jar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Artifact {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
}

impl Artifact {
    /// Read a jar from disk. It is registered on the server as `jars/<file name>`.
    pub(crate) fn jar(path: &Path) -> Result<Artifact, ClientError> {
        let data = fs::read(path).map_err(|source| {
            ClientError::new(ClientErrorKind::ArtifactRead { source, path: path.to_path_buf() })
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Artifact { name: format!("jars/{file_name}"), data })
    }

    /// Split the artifact into request payloads, in upload order.
    pub(crate) fn into_payloads(self) -> Vec<Payload> {
        if self.data.len() <= CHUNK_SIZE {
            return vec![Payload::Batch(Batch {
                artifacts: vec![SingleChunkArtifact {
                    name: self.name,
                    data: Some(chunk(&self.data)),
                }],
            })];
        }

        let num_chunks = self.data.len().div_ceil(CHUNK_SIZE);
        let mut chunks = self.data.chunks(CHUNK_SIZE);

        let mut payloads = Vec::with_capacity(num_chunks);
        payloads.push(Payload::BeginChunk(BeginChunkedArtifact {
            name: self.name.clone(),
            total_bytes: self.data.len() as i64,
            num_chunks: num_chunks as i64,
            initial_chunk: chunks.next().map(chunk),
        }));
        payloads.extend(chunks.map(|data| Payload::Chunk(chunk(data))));

        payloads
    }
}

fn chunk(data: &[u8]) -> ArtifactChunk {
    ArtifactChunk {
        data: data.to_vec(),
        crc: i64::from(crc32fast::hash(data)),
    }
}
