//! Shared test utilities for integration tests.
//!
//! Fakes for the provider's capabilities (response delivery, waiter client,
//! logger) and builders for lifecycle events.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use cfn_custom_resource_provider::{
    BoxError, HandlerResponse, InvocationContext, LifecycleEvent, LogInfo, Logger, ProviderConfig,
    ProviderContext, ProviderError, RequestType, ResourceOperation, ResponseEnvelope,
    ResponseSender, RetryOptions, StartExecutionRequest, StartExecutionResponse, WaiterClient,
};
use proptest::prelude::*;
use serde_json::{json, Value};

pub const WAITER_ARN: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:waiter";
pub const RESPONSE_URL: &str = "https://cloudformation-custom-resource-response.s3.amazonaws.com/abc";

// =============================================================================
// Recording Response Sender
// =============================================================================

/// A delivery recorded by [`RecordingSender`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub body: String,
}

impl Delivery {
    /// Parses the delivered body as a response envelope.
    pub fn envelope(&self) -> ResponseEnvelope {
        serde_json::from_str(&self.body).unwrap()
    }

    /// Parses the delivered body as raw JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Response sender that records every attempt and fails the first
/// `failures` of them.
#[derive(Default)]
pub struct RecordingSender {
    failures: Mutex<u32>,
    attempts: Mutex<u32>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `failures` delivery attempts.
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    /// Successful deliveries, in order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// All attempts, successful or not.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl ResponseSender for RecordingSender {
    async fn send(&self, url: &str, body: &str) -> Result<(), ProviderError> {
        *self.attempts.lock().unwrap() += 1;
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ProviderError::delivery("connection reset by peer"));
        }
        self.deliveries.lock().unwrap().push(Delivery {
            url: url.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Recording Waiter Client
// =============================================================================

/// Waiter client that records start requests.
#[derive(Default)]
pub struct RecordingWaiterClient {
    requests: Mutex<Vec<StartExecutionRequest>>,
    fail: bool,
}

impl RecordingWaiterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every start fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<StartExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaiterClient for RecordingWaiterClient {
    async fn start_execution(
        &self,
        request: &StartExecutionRequest,
    ) -> Result<StartExecutionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ProviderError::waiter_start("AccessDeniedException"));
        }
        Ok(StartExecutionResponse {
            execution_arn: format!("{}:{}", WAITER_ARN.replace("stateMachine", "execution"), request.name),
            start_date: None,
        })
    }
}

// =============================================================================
// Recording Logger
// =============================================================================

/// Logger that keeps every line as `LEVEL message`.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn record(&self, level: &str, message: &str) {
        self.lines.lock().unwrap().push(format!("{} {}", level, message));
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, _info: &LogInfo) {
        self.record("DEBUG", message);
    }

    fn info(&self, message: &str, _info: &LogInfo) {
        self.record("INFO", message);
    }

    fn warn(&self, message: &str, _info: &LogInfo) {
        self.record("WARN", message);
    }

    fn error(&self, message: &str, _info: &LogInfo) {
        self.record("ERROR", message);
    }
}

// =============================================================================
// Scripted Operation
// =============================================================================

/// Operation returning a fixed result and recording the events it saw.
pub struct ScriptedOperation {
    result: Box<dyn Fn() -> Result<Option<HandlerResponse>, BoxError> + Send + Sync>,
    seen: Mutex<Vec<LifecycleEvent>>,
}

impl ScriptedOperation {
    pub fn returning(response: Option<HandlerResponse>) -> Self {
        Self {
            result: Box::new(move || -> Result<Option<HandlerResponse>, BoxError> {
                Ok(response.clone())
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &'static str) -> Self {
        Self {
            result: Box::new(move || -> Result<Option<HandlerResponse>, BoxError> {
                Err(message.into())
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<LifecycleEvent> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceOperation for ScriptedOperation {
    async fn on_event(
        &self,
        event: LifecycleEvent,
        _context: &InvocationContext,
    ) -> Result<Option<HandlerResponse>, BoxError> {
        self.seen.lock().unwrap().push(event);
        (self.result)()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Capabilities wired to fresh fakes.
pub struct Harness {
    pub sender: Arc<RecordingSender>,
    pub waiter: Arc<RecordingWaiterClient>,
    pub logger: Arc<RecordingLogger>,
    pub ctx: ProviderContext,
}

impl Harness {
    /// A synchronous provider.
    pub fn sync() -> Self {
        Self::build(ProviderConfig::default(), RecordingSender::new(), RecordingWaiterClient::new())
    }

    /// An asynchronous provider with a working waiter.
    pub fn with_waiter() -> Self {
        Self::build(
            ProviderConfig::default().with_waiter_arn(WAITER_ARN),
            RecordingSender::new(),
            RecordingWaiterClient::new(),
        )
    }

    pub fn build(config: ProviderConfig, sender: RecordingSender, waiter: RecordingWaiterClient) -> Self {
        let sender = Arc::new(sender);
        let waiter = Arc::new(waiter);
        let logger = Arc::new(RecordingLogger::default());
        let ctx = ProviderContext::new(config.with_delivery_retry(fast_retry()), sender.clone())
            .with_waiter_client(waiter.clone())
            .with_logger(logger.clone());
        Self {
            sender,
            waiter,
            logger,
            ctx,
        }
    }
}

/// Retry budget with default attempts and millisecond delays.
pub fn fast_retry() -> RetryOptions {
    RetryOptions {
        retries: 5,
        base_delay: StdDuration::from_millis(1),
    }
}

pub fn invocation() -> InvocationContext {
    InvocationContext {
        request_id: "lambda-req-1".to_string(),
        invoked_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:provider".to_string(),
        deadline_ms: 0,
    }
}

/// Builds a lifecycle event as CloudFormation sends it.
pub fn lifecycle_event(request_type: RequestType, physical_resource_id: Option<&str>) -> LifecycleEvent {
    let mut value = json!({
        "RequestType": request_type.to_string(),
        "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:provider",
        "ResponseURL": RESPONSE_URL,
        "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/guid",
        "RequestId": "req-1",
        "LogicalResourceId": "MyResource",
        "ResourceType": "Custom::MyResource",
        "ResourceProperties": {"BucketName": "my-bucket"}
    });
    if let Some(id) = physical_resource_id {
        value["PhysicalResourceId"] = json!(id);
    }
    serde_json::from_value(value).unwrap()
}

/// Turns a waiter input back into the event the waiter invokes the provider with.
pub fn completion_check(input: &str) -> LifecycleEvent {
    serde_json::from_str(input).unwrap()
}

/// Wraps a serialized event in the cause the waiter sends on timeout.
pub fn timeout_cause(serialized_event: &str) -> String {
    json!({
        "errorType": "RetrySignal",
        "errorMessage": serialized_event,
        "trace": [],
    })
    .to_string()
}

// =============================================================================
// Proptest Strategies
// =============================================================================

/// Strategy for request types.
pub fn request_type_strategy() -> impl Strategy<Value = RequestType> {
    prop_oneof![
        Just(RequestType::Create),
        Just(RequestType::Update),
        Just(RequestType::Delete),
    ]
}

/// Strategy for `IsComplete` values that are neither `true` nor `false`.
pub fn undeclared_completion_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        any::<i64>().prop_map(|n| Some(json!(n))),
        "[a-z]{0,8}".prop_map(|s| Some(json!(s))),
        Just(Some(json!({}))),
        Just(Some(json!([true]))),
    ]
}
