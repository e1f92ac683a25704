//! Thin gRPC client over the Spark Connect service.

mod artifact;
mod builder;
mod error;

pub(crate) use artifact::Artifact;
pub(crate) use builder::ChannelBuilder;
pub(crate) use error::{ClientError, ClientErrorKind};

use crate::io;
use crate::spark;
use crate::spark::execute_plan_response::ResponseType;
use crate::spark::spark_connect_service_client::SparkConnectServiceClient;

use arrow::array::RecordBatch;
use futures_util::stream;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::codegen::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tracing::{debug, warn};
use uuid::Uuid;


/// Attaches the remote string's headers (authorization, cluster ids, ...) to every call.
#[derive(Clone, Debug, Default)]
pub(crate) struct HeaderInterceptor {
    headers: Vec<(AsciiMetadataKey, AsciiMetadataValue)>,
}

impl HeaderInterceptor {
    pub(crate) fn new(builder: &ChannelBuilder) -> Result<Self, ClientError> {
        let mut headers = vec![];

        for (key, value) in &builder.headers {
            let invalid = || ClientError::new(ClientErrorKind::InvalidHeader { key: key.clone() });
            let metadata_key = AsciiMetadataKey::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
            let metadata_value = value.parse::<AsciiMetadataValue>().map_err(|_| invalid())?;
            headers.push((metadata_key, metadata_value));
        }

        Ok(HeaderInterceptor { headers })
    }
}

impl Interceptor for HeaderInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        for (key, value) in &self.headers {
            request.metadata_mut().insert(key.clone(), value.clone());
        }
        Ok(request)
    }
}

/// Everything the server streamed back for one `ExecutePlan` call.
#[derive(Debug, Default)]
pub(crate) struct ExecutionResult {
    pub(crate) operation_id: String,
    pub(crate) batches: Vec<RecordBatch>,
    pub(crate) row_count: i64,
    pub(crate) complete: bool,
}

impl ExecutionResult {
    pub(crate) fn new(operation_id: String) -> Self {
        ExecutionResult { operation_id, ..Default::default() }
    }

    /// Fold one streamed response into the result.
    pub(crate) fn absorb(&mut self, response: spark::ExecutePlanResponse) -> Result<(), ClientError> {
        match response.response_type {
            Some(ResponseType::ArrowBatch(batch)) => {
                let decoded = io::deserialize(&batch.data, batch.row_count)?;
                self.row_count += batch.row_count;
                self.batches.extend(decoded);
            }
            Some(ResponseType::ResultComplete(_)) => self.complete = true,
            None => {}
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct SparkClient {
    stub: SparkConnectServiceClient<InterceptedService<Channel, HeaderInterceptor>>,
    builder: ChannelBuilder,
}

impl SparkClient {
    pub(crate) fn new(channel: Channel, builder: ChannelBuilder) -> Result<Self, ClientError> {
        let interceptor = HeaderInterceptor::new(&builder)?;
        let stub = SparkConnectServiceClient::with_interceptor(channel, interceptor);

        Ok(SparkClient { stub, builder })
    }

    pub(crate) fn session_id(&self) -> String {
        self.builder.session_id.to_string()
    }

    pub(crate) fn validate_session(&self, response_session_id: &str) -> Result<(), ClientError> {
        let client_session_id = self.session_id();
        if !response_session_id.is_empty() && response_session_id != client_session_id {
            return Err(ClientError::new(ClientErrorKind::SessionIDMismatch {
                client_session_id,
                response_session_id: response_session_id.to_string(),
            }));
        }
        Ok(())
    }

    /// Submit a plan and drain the response stream.
    pub(crate) async fn execute_plan(&self, plan: spark::Plan) -> Result<ExecutionResult, ClientError> {
        let operation_id = Uuid::new_v4().to_string();
        let request = spark::ExecutePlanRequest {
            session_id: self.session_id(),
            user_context: Some(self.builder.user_context()),
            plan: Some(plan),
            client_type: Some(self.builder.user_agent.clone()),
            operation_id: Some(operation_id.clone()),
            tags: vec![],
        };

        debug!(%operation_id, "submitting plan");

        let mut stub = self.stub.clone();
        let mut responses = stub
            .execute_plan(request)
            .await
            .map_err(|status| ClientError::new(ClientErrorKind::ExecutePlanRequest {
                status, operation_id: operation_id.clone()
            }))?
            .into_inner();

        let mut result = ExecutionResult::new(operation_id);

        while let Some(response) = responses
            .message()
            .await
            .map_err(|status| ClientError::new(ClientErrorKind::Stream {
                status, operation_id: result.operation_id.clone()
            }))?
        {
            self.validate_session(&response.session_id)?;
            result.absorb(response)?;
        }

        if !result.complete {
            warn!(operation_id = %result.operation_id, "stream ended without a result-complete marker");
        }

        debug!(
            operation_id = %result.operation_id,
            batches = result.batches.len(),
            rows = result.row_count,
            "plan finished"
        );

        Ok(result)
    }

    /// Set session configuration; keys the server refuses to change at runtime are skipped.
    pub(crate) async fn set_config(&self, pairs: &[(String, String)]) -> Result<Vec<String>, ClientError> {
        let request = spark::ConfigRequest {
            session_id: self.session_id(),
            user_context: Some(self.builder.user_context()),
            operation: Some(spark::config_request::Operation {
                op_type: Some(spark::config_request::operation::OpType::Set(
                    spark::config_request::Set {
                        pairs: pairs
                            .iter()
                            .map(|(key, value)| spark::KeyValue {
                                key: key.clone(),
                                value: Some(value.clone()),
                            })
                            .collect(),
                        silent: Some(true),
                    },
                )),
            }),
            client_type: Some(self.builder.user_agent.clone()),
        };

        let mut stub = self.stub.clone();
        let response = stub
            .config(request)
            .await
            .map_err(|status| ClientError::new(ClientErrorKind::ConfigRequest {
                status,
                keys: pairs.iter().map(|(key, _)| key.clone()).collect(),
            }))?
            .into_inner();

        self.validate_session(&response.session_id)?;

        Ok(response.warnings)
    }

    pub(crate) async fn add_artifacts(&self, artifacts: Vec<Artifact>) -> Result<(), ClientError> {
        let names: Vec<String> = artifacts.iter().map(|artifact| artifact.name.clone()).collect();

        let requests: Vec<spark::AddArtifactsRequest> = artifacts
            .into_iter()
            .flat_map(Artifact::into_payloads)
            .map(|payload| spark::AddArtifactsRequest {
                session_id: self.session_id(),
                user_context: Some(self.builder.user_context()),
                client_type: Some(self.builder.user_agent.clone()),
                payload: Some(payload),
            })
            .collect();

        debug!(?names, messages = requests.len(), "uploading artifacts");

        let mut stub = self.stub.clone();
        let response = stub
            .add_artifacts(stream::iter(requests))
            .await
            .map_err(|status| ClientError::new(ClientErrorKind::AddArtifactsRequest {
                status, names
            }))?
            .into_inner();

        self.validate_session(&response.session_id)?;

        if let Some(failed) = response.artifacts.into_iter().find(|summary| !summary.is_crc_successful) {
            return Err(ClientError::new(ClientErrorKind::ArtifactCrcMismatch { name: failed.name }));
        }

        Ok(())
    }

    pub(crate) async fn release_session(&self) -> Result<(), ClientError> {
        let request = spark::ReleaseSessionRequest {
            session_id: self.session_id(),
            user_context: Some(self.builder.user_context()),
            client_type: Some(self.builder.user_agent.clone()),
        };

        let mut stub = self.stub.clone();
        stub.release_session(request)
            .await
            .map_err(|status| ClientError::new(ClientErrorKind::ReleaseSessionRequest { status }))?;

        Ok(())
    }
}
