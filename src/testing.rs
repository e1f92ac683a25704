//! In-process Spark Connect server used to drive the client over real gRPC.

use crate::spark;
use crate::spark::add_artifacts_request::Payload;
use crate::spark::add_artifacts_response::ArtifactSummary;
use crate::spark::execute_plan_response::{ArrowBatch, ResponseType, ResultComplete};
use crate::spark::spark_connect_service_server::{SparkConnectService, SparkConnectServiceServer};

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::StreamWriter;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

/// How the server misbehaves.
#[derive(Clone, Debug, Default)]
pub(crate) struct Behavior {
    /// Config keys answered with FAILED_PRECONDITION, like a server that cannot modify them.
    pub(crate) refused_keys: Vec<&'static str>,
    pub(crate) corrupt_artifacts: bool,
    /// Session id stamped on ExecutePlan responses instead of the caller's.
    pub(crate) response_session_id: Option<String>,
    /// Values of the single `count(1)` column returned by every plan.
    pub(crate) rows: Vec<i64>,
}

/// What the server received.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) config_keys: Vec<Vec<String>>,
    pub(crate) artifacts: Vec<String>,
    pub(crate) plans: Vec<spark::Plan>,
    pub(crate) releases: usize,
}

struct StubService {
    behavior: Behavior,
    calls: Arc<Mutex<Calls>>,
}

#[tonic::async_trait]
impl SparkConnectService for StubService {
    type ExecutePlanStream = BoxStream<'static, Result<spark::ExecutePlanResponse, Status>>;

    async fn execute_plan(
        &self,
        request: Request<spark::ExecutePlanRequest>,
    ) -> Result<Response<Self::ExecutePlanStream>, Status> {
        let request = request.into_inner();
        if let Some(plan) = request.plan {
            self.calls.lock().unwrap().plans.push(plan);
        }

        let session_id = self.behavior.response_session_id.clone().unwrap_or(request.session_id);
        let operation_id = request.operation_id.unwrap_or_default();

        let mut types = vec![];
        if !self.behavior.rows.is_empty() {
            types.push(ResponseType::ArrowBatch(ArrowBatch {
                row_count: self.behavior.rows.len() as i64,
                data: encode(&self.behavior.rows),
                start_offset: None,
            }));
        }
        types.push(ResponseType::ResultComplete(ResultComplete {}));

        let responses: Vec<Result<spark::ExecutePlanResponse, Status>> = types
            .into_iter()
            .map(|response_type| {
                Ok(spark::ExecutePlanResponse {
                    session_id: session_id.clone(),
                    operation_id: operation_id.clone(),
                    response_type: Some(response_type),
                    ..Default::default()
                })
            })
            .collect();

        Ok(Response::new(stream::iter(responses).boxed()))
    }

    async fn config(&self, request: Request<spark::ConfigRequest>) -> Result<Response<spark::ConfigResponse>, Status> {
        let request = request.into_inner();
        let keys: Vec<String> = match request.operation.and_then(|operation| operation.op_type) {
            Some(spark::config_request::operation::OpType::Set(set)) => {
                set.pairs.into_iter().map(|pair| pair.key).collect()
            }
            None => vec![],
        };
        self.calls.lock().unwrap().config_keys.push(keys.clone());

        if let Some(key) = keys.iter().find(|key| self.behavior.refused_keys.contains(&key.as_str())) {
            return Err(Status::failed_precondition(format!("Cannot modify the value of a Spark config: \"{key}\"")));
        }

        Ok(Response::new(spark::ConfigResponse {
            session_id: request.session_id,
            ..Default::default()
        }))
    }

    async fn add_artifacts(
        &self,
        request: Request<Streaming<spark::AddArtifactsRequest>>,
    ) -> Result<Response<spark::AddArtifactsResponse>, Status> {
        let mut requests = request.into_inner();
        let mut session_id = String::new();
        let mut names = vec![];

        while let Some(request) = requests.message().await? {
            session_id = request.session_id;
            match request.payload {
                Some(Payload::Batch(batch)) => names.extend(batch.artifacts.into_iter().map(|artifact| artifact.name)),
                Some(Payload::BeginChunk(begin)) => names.push(begin.name),
                Some(Payload::Chunk(_)) | None => {}
            }
        }

        self.calls.lock().unwrap().artifacts.extend(names.iter().cloned());

        Ok(Response::new(spark::AddArtifactsResponse {
            artifacts: names
                .into_iter()
                .map(|name| ArtifactSummary { name, is_crc_successful: !self.behavior.corrupt_artifacts })
                .collect(),
            session_id,
            ..Default::default()
        }))
    }

    async fn release_session(
        &self,
        request: Request<spark::ReleaseSessionRequest>,
    ) -> Result<Response<spark::ReleaseSessionResponse>, Status> {
        self.calls.lock().unwrap().releases += 1;

        Ok(Response::new(spark::ReleaseSessionResponse {
            session_id: request.into_inner().session_id,
            ..Default::default()
        }))
    }
}

pub(crate) struct StubServer {
    pub(crate) remote: String,
    calls: Arc<Mutex<Calls>>,
}

impl StubServer {
    /// Serve on an ephemeral local port until the test runtime shuts down.
    pub(crate) async fn start(behavior: Behavior) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let calls = Arc::new(Mutex::new(Calls::default()));

        let service = StubService { behavior, calls: calls.clone() };
        let incoming = stream::unfold(listener, |listener| async move {
            let accepted = listener.accept().await.map(|(socket, _)| socket);
            Some((accepted, listener))
        });

        tokio::spawn(
            Server::builder()
                .add_service(SparkConnectServiceServer::new(service))
                .serve_with_incoming(Box::pin(incoming)),
        );

        StubServer { remote: format!("sc://127.0.0.1:{port}"), calls }
    }

    pub(crate) fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

/// Arrow IPC stream holding one `count(1)` batch.
pub(crate) fn encode(values: &[i64]) -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![Field::new("count(1)", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap();

    let mut buffer = vec![];
    let mut writer = StreamWriter::try_new(&mut buffer, &schema).unwrap();
    writer.write(&batch).unwrap();
    writer.finish().unwrap();
    drop(writer);
    buffer
}

/// A throwaway jar of `len` bytes in the temp directory.
pub(crate) fn temp_jar(len: usize) -> PathBuf {
    let path = std::env::temp_dir().join(format!("driver-{}.jar", uuid::Uuid::new_v4()));
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}
