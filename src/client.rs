//! Outbound clients: the CloudFormation response callback and the
//! Step Functions waiter.
//!
//! Both are traits so the handler can be exercised without network access.
//! The production implementations share one `reqwest` client each and are
//! built once per process.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Delivers a serialized response envelope to a callback URL.
#[async_trait]
pub trait ResponseSender: Send + Sync {
    /// Sends one delivery attempt. Retrying is the caller's job.
    async fn send(&self, url: &str, body: &str) -> Result<(), ProviderError>;
}

/// Shared reference to a response sender.
pub type SharedResponseSender = Arc<dyn ResponseSender>;

/// Sends responses with an HTTP PUT to the pre-signed S3 URL.
#[derive(Debug, Clone, Default)]
pub struct HttpResponseSender {
    http_client: reqwest::Client,
}

impl HttpResponseSender {
    /// Creates a sender with a fresh HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sender reusing an existing HTTP client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    async fn send(&self, url: &str, body: &str) -> Result<(), ProviderError> {
        // The pre-signed URL is signed without a content type.
        let response = self
            .http_client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::delivery(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "callback URL rejected the response");
        }
        Ok(())
    }
}

/// Request to start a waiter execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub state_machine_arn: String,
    /// Execution name; the CloudFormation request id, which makes the start idempotent.
    pub name: String,
    /// Serialized completion-check request.
    pub input: String,
}

/// Response of a waiter start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionResponse {
    pub execution_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<f64>,
}

/// Starts executions of the completion waiter state machine.
#[async_trait]
pub trait WaiterClient: Send + Sync {
    async fn start_execution(
        &self,
        request: &StartExecutionRequest,
    ) -> Result<StartExecutionResponse, ProviderError>;
}

/// Shared reference to a waiter client.
pub type SharedWaiterClient = Arc<dyn WaiterClient>;

/// Configuration for the Step Functions waiter client.
#[derive(Debug, Clone)]
pub struct StepFunctionsClientConfig {
    /// AWS region of the state machine
    pub region: String,
    /// Optional custom endpoint URL (for testing)
    pub endpoint_url: Option<String>,
}

impl Default for StepFunctionsClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
        }
    }
}

impl StepFunctionsClientConfig {
    /// Creates a config for the given region.
    pub fn with_region(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
        }
    }

    /// Creates a config from AWS SDK config.
    pub fn from_aws_config(config: &aws_config::SdkConfig) -> Self {
        Self {
            region: config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint_url: None,
        }
    }
}

const START_EXECUTION_TARGET: &str = "AWSStepFunctions.StartExecution";
const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Step Functions client calling `StartExecution` with SigV4-signed requests.
pub struct StepFunctionsWaiterClient {
    http_client: reqwest::Client,
    credentials_provider: Arc<dyn ProvideCredentials>,
    config: StepFunctionsClientConfig,
}

impl StepFunctionsWaiterClient {
    /// Creates a client from the default AWS configuration chain.
    pub async fn from_env() -> Result<Self, ProviderError> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_aws_config(&aws_config)
    }

    /// Creates a client from AWS SDK config.
    pub fn from_aws_config(aws_config: &aws_config::SdkConfig) -> Result<Self, ProviderError> {
        let credentials_provider = aws_config
            .credentials_provider()
            .ok_or_else(|| ProviderError::configuration("No credentials provider configured"))?;

        Ok(Self {
            http_client: reqwest::Client::new(),
            credentials_provider: Arc::new(credentials_provider),
            config: StepFunctionsClientConfig::from_aws_config(aws_config),
        })
    }

    /// Creates a client with explicit credentials and configuration.
    pub fn with_config(
        credentials_provider: Arc<dyn ProvideCredentials>,
        config: StepFunctionsClientConfig,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            credentials_provider,
            config,
        }
    }

    fn endpoint_url(&self) -> String {
        self.config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://states.{}.amazonaws.com/", self.config.region))
    }

    /// Signs a POST to the Step Functions endpoint and returns the headers to send.
    async fn sign_request(
        &self,
        uri: &str,
        body: &[u8],
    ) -> Result<Vec<(String, String)>, ProviderError> {
        let credentials = self
            .credentials_provider
            .provide_credentials()
            .await
            .map_err(|e| {
                ProviderError::waiter_start(format!("Failed to get AWS credentials: {}", e))
            })?;

        let identity = credentials.into();
        let signing_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.config.region)
            .name("states")
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| {
                ProviderError::waiter_start(format!("Failed to build signing params: {}", e))
            })?;

        let headers = [
            ("content-type", AMZ_JSON_CONTENT_TYPE),
            ("x-amz-target", START_EXECUTION_TARGET),
        ];
        let signable_request = SignableRequest::new(
            "POST",
            uri,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| {
            ProviderError::waiter_start(format!("Failed to create signable request: {}", e))
        })?;

        let (signing_instructions, _signature) = sign(signable_request, &signing_params.into())
            .map_err(|e| ProviderError::waiter_start(format!("Failed to sign request: {}", e)))?
            .into_parts();

        let mut temp_request = http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(())
            .map_err(|e| {
                ProviderError::waiter_start(format!("Failed to build temp request: {}", e))
            })?;
        signing_instructions.apply_to_request_http1x(&mut temp_request);

        Ok(temp_request
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect())
    }
}

#[async_trait]
impl WaiterClient for StepFunctionsWaiterClient {
    async fn start_execution(
        &self,
        request: &StartExecutionRequest,
    ) -> Result<StartExecutionResponse, ProviderError> {
        let body = serde_json::to_vec(request)?;
        let uri = self.endpoint_url();
        let signed_headers = self.sign_request(&uri, &body).await?;

        let mut http_request = self
            .http_client
            .post(&uri)
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON_CONTENT_TYPE)
            .header("X-Amz-Target", START_EXECUTION_TARGET)
            .body(body);
        for (name, value) in signed_headers {
            http_request = http_request.header(&name, &value);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::waiter_start(format!("HTTP request failed: {}", e)))?;
        let status = response.status();
        let response_body = response.bytes().await.map_err(|e| {
            ProviderError::waiter_start(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(ProviderError::waiter_start(format!(
                "StartExecution returned {}: {}",
                status,
                String::from_utf8_lossy(&response_body)
            )));
        }

        Ok(serde_json::from_slice(&response_body)?)
    }
}
