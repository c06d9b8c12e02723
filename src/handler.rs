//! The provider entrypoint.
//!
//! [`handle`] runs one invocation of the provider function: it invokes the
//! user operation, merges its response into the event, and decides between
//! reporting to CloudFormation, starting the completion waiter, or asking the
//! waiter to poll again.
//!
//! # Completion protocol
//!
//! | Waiter configured | `IsComplete`  | `IsWaiting` on event | Outcome                 |
//! |-------------------|---------------|----------------------|-------------------------|
//! | no                | any           | any                  | SUCCESS                 |
//! | yes               | `true`        | any                  | SUCCESS                 |
//! | yes               | `false`       | absent               | start waiter            |
//! | yes               | `false`       | present              | retry                   |
//! | yes               | anything else | any                  | FAILED                  |

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{
    HttpResponseSender, SharedResponseSender, SharedWaiterClient, StartExecutionRequest,
    StepFunctionsWaiterClient,
};
use crate::config::ProviderConfig;
use crate::error::{BoxError, ErrorObject, ProviderError};
use crate::event::{Completion, HandlerResponse, InboundEvent, LifecycleEvent, RequestType, TimeoutEvent};
use crate::logger::{LogInfo, Logger, TracingLogger};
use crate::response::{
    render_response, Response, ResponseEnvelope, ResponseStatus, CREATE_FAILED_PHYSICAL_ID_MARKER,
    MISSING_PHYSICAL_ID_MARKER,
};
use crate::retry::with_retries;

/// Reason reported when an async operation does not declare completion.
pub const MISSING_COMPLETION_REASON: &str =
    "Async handler implementation failed to explictly mark action with IsComplete";

/// Reason reported when the waiter runs out of retries.
pub const TIMEOUT_REASON: &str = "Operation timed out";

/// Per-invocation metadata passed to the user operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// Lambda request id of this invocation
    pub request_id: String,
    /// ARN of the provider function
    pub invoked_function_arn: String,
    /// Invocation deadline in epoch milliseconds
    pub deadline_ms: u64,
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(context: &lambda_runtime::Context) -> Self {
        Self {
            request_id: context.request_id.clone(),
            invoked_function_arn: context.invoked_function_arn.clone(),
            deadline_ms: context.deadline,
        }
    }
}

/// A custom resource operation implemented by the provider author.
///
/// The event's `ResponseURL` is masked. Returning `Ok(None)` is the same as
/// returning an empty [`HandlerResponse`].
#[async_trait]
pub trait ResourceOperation: Send + Sync {
    async fn on_event(
        &self,
        event: LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<Option<HandlerResponse>, BoxError>;
}

/// Adapter turning an async closure into a [`ResourceOperation`].
pub struct FnOperation<F> {
    f: F,
}

/// Wraps an async closure as a [`ResourceOperation`].
pub fn operation_fn<F, Fut>(f: F) -> FnOperation<F>
where
    F: Fn(LifecycleEvent, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<HandlerResponse>, BoxError>> + Send,
{
    FnOperation { f }
}

#[async_trait]
impl<F, Fut> ResourceOperation for FnOperation<F>
where
    F: Fn(LifecycleEvent, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<HandlerResponse>, BoxError>> + Send,
{
    async fn on_event(
        &self,
        event: LifecycleEvent,
        context: &InvocationContext,
    ) -> Result<Option<HandlerResponse>, BoxError> {
        (self.f)(event, context.clone()).await
    }
}

/// Capabilities of the provider process, built once at startup.
#[derive(Clone)]
pub struct ProviderContext {
    config: ProviderConfig,
    sender: SharedResponseSender,
    waiter: Option<SharedWaiterClient>,
    logger: Arc<dyn Logger>,
}

impl ProviderContext {
    /// Creates a context that sends responses with `sender` and logs through `tracing`.
    pub fn new(config: ProviderConfig, sender: SharedResponseSender) -> Self {
        Self {
            config,
            sender,
            waiter: None,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Builds the production context from the Lambda environment.
    ///
    /// The Step Functions client is only created when a waiter is configured.
    pub async fn from_env() -> Result<Self, ProviderError> {
        let config = ProviderConfig::from_env();
        let waiter_enabled = config.waiter_enabled();
        let mut context = Self::new(config, Arc::new(HttpResponseSender::new()));
        if waiter_enabled {
            let client = StepFunctionsWaiterClient::from_env().await?;
            context = context.with_waiter_client(Arc::new(client));
        }
        Ok(context)
    }

    /// Sets the client used to start waiter executions.
    pub fn with_waiter_client(mut self, waiter: SharedWaiterClient) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Replaces the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

/// What an invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// A terminal response was delivered to CloudFormation.
    Submitted(ResponseEnvelope),
    /// The completion waiter was started; nothing was reported yet.
    WaiterStarted(StartExecutionRequest),
    /// The operation is still running. Carries the serialized inbound event,
    /// which must be raised as the invocation's error so the waiter retries.
    Retry(String),
}

impl HandlerOutcome {
    /// Returns the delivered envelope, if any.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Submitted(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Returns true if the waiter must invoke the provider again.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

/// Handles one invocation of the provider function.
///
/// Errors are only returned when nothing could be reported to CloudFormation:
/// the response could not be delivered, or a timeout payload was unreadable.
pub async fn handle(
    event: InboundEvent,
    invocation: &InvocationContext,
    operation: &dyn ResourceOperation,
    ctx: &ProviderContext,
) -> Result<HandlerOutcome, ProviderError> {
    match event {
        InboundEvent::Timeout(timeout) => on_timeout(&timeout, ctx).await,
        InboundEvent::Lifecycle(event) => on_lifecycle_event(event, invocation, operation, ctx).await,
    }
}

async fn on_lifecycle_event(
    event: LifecycleEvent,
    invocation: &InvocationContext,
    operation: &dyn ResourceOperation,
    ctx: &ProviderContext,
) -> Result<HandlerOutcome, ProviderError> {
    let info = LogInfo::from(&event);
    let sanitized = event.sanitized();
    ctx.logger.info(
        &serde_json::to_string_pretty(&sanitized).unwrap_or_default(),
        &info,
    );

    if event.request_type == RequestType::Delete
        && event.physical_resource_id.as_deref() == Some(CREATE_FAILED_PHYSICAL_ID_MARKER)
    {
        ctx.logger
            .info("ignoring DELETE event caused by a failed CREATE event", &info);
        let envelope = submit_response(ResponseStatus::Success, &Response::from(event), ctx).await?;
        return Ok(HandlerOutcome::Submitted(envelope));
    }

    match run_operation(&event, sanitized, invocation, operation, ctx).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            ctx.logger.error(
                &serde_json::to_string(&ErrorObject::from(&error)).unwrap_or_default(),
                &info,
            );
            let mut response =
                Response::from(event.clone()).with_reason(error.reason(ctx.config.include_stack_traces));

            if response.physical_resource_id.as_deref().unwrap_or("").is_empty() {
                if event.request_type == RequestType::Create {
                    ctx.logger.info(
                        "CREATE failed, responding with a marker physical resource id so that the subsequent DELETE will be ignored",
                        &info,
                    );
                    response.physical_resource_id = Some(CREATE_FAILED_PHYSICAL_ID_MARKER.to_string());
                } else {
                    ctx.logger.error(
                        &format!(
                            "ERROR: Malformed event. \"PhysicalResourceId\" is required: {}",
                            serde_json::to_string(&event.sanitized()).unwrap_or_default()
                        ),
                        &info,
                    );
                }
            }

            let envelope = submit_response(ResponseStatus::Failed, &response, ctx).await?;
            Ok(HandlerOutcome::Submitted(envelope))
        }
    }
}

/// Invokes the operation and applies the completion protocol.
///
/// Every error returned from here is reported to CloudFormation as FAILED.
async fn run_operation(
    event: &LifecycleEvent,
    sanitized: LifecycleEvent,
    invocation: &InvocationContext,
    operation: &dyn ResourceOperation,
    ctx: &ProviderContext,
) -> Result<HandlerOutcome, ProviderError> {
    let result = operation
        .on_event(sanitized, invocation)
        .await
        .map_err(ProviderError::operation)?;

    let response = render_response(event, result)?;

    let Some(waiter_arn) = ctx.config.waiter_arn.as_deref() else {
        let envelope = submit_response(ResponseStatus::Success, &response, ctx).await?;
        return Ok(HandlerOutcome::Submitted(envelope));
    };

    match Completion::of(response.is_complete.as_ref()) {
        Completion::Complete => {
            let envelope = submit_response(ResponseStatus::Success, &response, ctx).await?;
            Ok(HandlerOutcome::Submitted(envelope))
        }
        Completion::Undeclared => {
            let response = response.with_reason(MISSING_COMPLETION_REASON);
            let envelope = submit_response(ResponseStatus::Failed, &response, ctx).await?;
            Ok(HandlerOutcome::Submitted(envelope))
        }
        Completion::Pending if event.is_completion_check() => {
            Ok(HandlerOutcome::Retry(serde_json::to_string(event)?))
        }
        Completion::Pending => {
            let request = StartExecutionRequest {
                state_machine_arn: waiter_arn.to_string(),
                name: response.request_id.clone(),
                input: serde_json::to_string(&Response {
                    is_waiting: Some(Value::Bool(true)),
                    ..response
                })?,
            };
            start_waiter(&request, ctx).await?;
            Ok(HandlerOutcome::WaiterStarted(request))
        }
    }
}

async fn start_waiter(
    request: &StartExecutionRequest,
    ctx: &ProviderContext,
) -> Result<(), ProviderError> {
    let info = LogInfo::new().with_request_id(request.name.clone());
    ctx.logger.info(
        &format!(
            "starting waiter {} for request {}",
            request.state_machine_arn, request.name
        ),
        &info,
    );
    let waiter = ctx
        .waiter
        .as_ref()
        .ok_or_else(|| ProviderError::waiter_start("no waiter client configured"))?;
    let execution = waiter.start_execution(request).await?;
    ctx.logger
        .debug(&format!("waiter started: {}", execution.execution_arn), &info);
    Ok(())
}

/// Reports a timeout once the waiter has exhausted its retries.
async fn on_timeout(
    timeout: &TimeoutEvent,
    ctx: &ProviderContext,
) -> Result<HandlerOutcome, ProviderError> {
    let request: Response = timeout.completion_request()?;
    ctx.logger.warn("completion waiter timed out", &LogInfo::from(&request));
    let response = request.with_reason(TIMEOUT_REASON);
    let envelope = submit_response(ResponseStatus::Failed, &response, ctx).await?;
    Ok(HandlerOutcome::Submitted(envelope))
}

/// Delivers a terminal response to the event's callback URL.
pub async fn submit_response(
    status: ResponseStatus,
    response: &Response,
    ctx: &ProviderContext,
) -> Result<ResponseEnvelope, ProviderError> {
    let envelope = ResponseEnvelope::new(status, response);
    deliver(&envelope, &response.response_url, &LogInfo::from(response), ctx).await?;
    Ok(envelope)
}

/// Reports a payload that could not be read as a lifecycle event as FAILED.
///
/// This needs the payload to still carry `ResponseURL`, `StackId`,
/// `RequestId` and `LogicalResourceId` as strings. Returns `Ok(None)` when
/// there is nowhere to report to.
pub async fn reject_malformed_event(
    payload: &Value,
    error: &ProviderError,
    ctx: &ProviderContext,
) -> Result<Option<ResponseEnvelope>, ProviderError> {
    let (Some(url), Some(stack_id), Some(request_id), Some(logical_resource_id)) = (
        str_field(payload, "ResponseURL"),
        str_field(payload, "StackId"),
        str_field(payload, "RequestId"),
        str_field(payload, "LogicalResourceId"),
    ) else {
        return Ok(None);
    };
    let request_type = str_field(payload, "RequestType");

    let physical_resource_id = match str_field(payload, "PhysicalResourceId") {
        Some(id) if !id.is_empty() => id,
        _ if request_type == Some("Create") => CREATE_FAILED_PHYSICAL_ID_MARKER,
        _ => MISSING_PHYSICAL_ID_MARKER,
    };

    let info = LogInfo {
        stack_id: Some(stack_id.to_string()),
        request_id: Some(request_id.to_string()),
        logical_resource_id: Some(logical_resource_id.to_string()),
        request_type: request_type.map(str::to_string),
    };
    ctx.logger
        .error(&format!("ERROR: Malformed event. {}", error), &info);

    let envelope = ResponseEnvelope {
        status: ResponseStatus::Failed,
        reason: error.to_string(),
        stack_id: stack_id.to_string(),
        request_id: request_id.to_string(),
        physical_resource_id: physical_resource_id.to_string(),
        logical_resource_id: logical_resource_id.to_string(),
        no_echo: None,
        data: None,
    };
    deliver(&envelope, url, &info, ctx).await?;
    Ok(Some(envelope))
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

async fn deliver(
    envelope: &ResponseEnvelope,
    url: &str,
    info: &LogInfo,
    ctx: &ProviderContext,
) -> Result<(), ProviderError> {
    let body = serde_json::to_string(envelope)?;
    ctx.logger
        .info(&format!("submit response to cloudformation {}", body), info);

    let sender = ctx.sender.as_ref();
    let payload = body.as_str();
    with_retries(ctx.config.delivery_retry, move || sender.send(url, payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResponseSender;
    use crate::retry::RetryOptions;
    use serde_json::{json, Map};
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    #[derive(Default)]
    struct RecordingSender {
        bodies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ResponseSender for RecordingSender {
        async fn send(&self, url: &str, body: &str) -> Result<(), ProviderError> {
            self.bodies
                .lock()
                .unwrap()
                .push((url.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl ResponseSender for FailingSender {
        async fn send(&self, _url: &str, _body: &str) -> Result<(), ProviderError> {
            Err(ProviderError::delivery("connection refused"))
        }
    }

    fn create_event() -> LifecycleEvent {
        LifecycleEvent {
            request_type: RequestType::Create,
            stack_id: "stack-1".to_string(),
            request_id: "req-1".to_string(),
            logical_resource_id: "MyResource".to_string(),
            physical_resource_id: None,
            response_url: "https://example.com/callback".to_string(),
            resource_properties: Map::new(),
            is_waiting: None,
            extra: Map::new(),
        }
    }

    fn fast_retry() -> RetryOptions {
        RetryOptions {
            retries: 2,
            base_delay: StdDuration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_operation_sees_sanitized_event() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = ProviderContext::new(ProviderConfig::default(), sender.clone());
        let seen = Arc::new(Mutex::new(None));
        let seen_by_op = Arc::clone(&seen);
        let operation = operation_fn(move |event: LifecycleEvent, _ctx: InvocationContext| {
            let seen = Arc::clone(&seen_by_op);
            async move {
                *seen.lock().unwrap() = Some(event.response_url.clone());
                Ok::<_, BoxError>(None)
            }
        });

        let outcome = handle(
            InboundEvent::Lifecycle(create_event()),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("..."));
        let envelope = outcome.envelope().unwrap();
        assert_eq!(envelope.status, ResponseStatus::Success);
        assert_eq!(envelope.physical_resource_id, "req-1");
        let bodies = sender.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].0, "https://example.com/callback");
    }

    #[tokio::test]
    async fn test_failed_create_reports_marker() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = ProviderContext::new(
            ProviderConfig::default().with_stack_traces(false),
            sender.clone(),
        );
        let operation = operation_fn(|_event: LifecycleEvent, _ctx: InvocationContext| async {
            Err::<Option<HandlerResponse>, BoxError>("quota exceeded".into())
        });

        let outcome = handle(
            InboundEvent::Lifecycle(create_event()),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap();

        let envelope = outcome.envelope().unwrap();
        assert_eq!(envelope.status, ResponseStatus::Failed);
        assert_eq!(envelope.reason, "quota exceeded");
        assert_eq!(envelope.physical_resource_id, CREATE_FAILED_PHYSICAL_ID_MARKER);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_physical_id() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = ProviderContext::new(ProviderConfig::default(), sender);
        let operation = operation_fn(|_event: LifecycleEvent, _ctx: InvocationContext| async {
            Err::<Option<HandlerResponse>, BoxError>("update rejected".into())
        });
        let mut event = create_event();
        event.request_type = RequestType::Update;
        event.physical_resource_id = Some("P".to_string());

        let outcome = handle(
            InboundEvent::Lifecycle(event),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(outcome.envelope().unwrap().physical_resource_id, "P");
    }

    #[tokio::test]
    async fn test_pending_without_waiter_client_fails() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = ProviderContext::new(
            ProviderConfig::default()
                .with_waiter_arn("arn:aws:states:us-east-1:123456789012:stateMachine:waiter")
                .with_stack_traces(false),
            sender,
        );
        let operation = operation_fn(|_event: LifecycleEvent, _ctx: InvocationContext| async {
            Ok::<_, BoxError>(Some(HandlerResponse::new().with_complete(false)))
        });

        let outcome = handle(
            InboundEvent::Lifecycle(create_event()),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap();
        let envelope = outcome.envelope().unwrap();
        assert_eq!(envelope.status, ResponseStatus::Failed);
        assert_eq!(envelope.reason, "Failed to start waiter: no waiter client configured");
    }

    #[tokio::test]
    async fn test_undeliverable_response_is_an_error() {
        let ctx = ProviderContext::new(
            ProviderConfig::default().with_delivery_retry(fast_retry()),
            Arc::new(FailingSender),
        );
        let operation = operation_fn(|_event: LifecycleEvent, _ctx: InvocationContext| async {
            Ok::<_, BoxError>(None)
        });

        let error = handle(
            InboundEvent::Lifecycle(create_event()),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(error.is_delivery());
    }

    #[tokio::test]
    async fn test_timeout_reports_failure() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = ProviderContext::new(ProviderConfig::default(), sender.clone());
        let mut original = create_event();
        original.physical_resource_id = Some("X".to_string());
        original.is_waiting = Some(json!(true));
        let cause = json!({
            "errorType": "Error",
            "errorMessage": serde_json::to_string(&original).unwrap(),
        });
        let operation = operation_fn(|_event: LifecycleEvent, _ctx: InvocationContext| async {
            Ok::<_, BoxError>(None)
        });

        let outcome = handle(
            InboundEvent::Timeout(TimeoutEvent {
                cause: cause.to_string(),
            }),
            &InvocationContext::default(),
            &operation,
            &ctx,
        )
        .await
        .unwrap();

        let envelope = outcome.envelope().unwrap();
        assert_eq!(envelope.status, ResponseStatus::Failed);
        assert_eq!(envelope.reason, TIMEOUT_REASON);
        assert_eq!(envelope.physical_resource_id, "X");
        assert_eq!(envelope.request_id, "req-1");
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(HandlerOutcome::Retry("{}".to_string()).is_retry());
        assert!(HandlerOutcome::Retry("{}".to_string()).envelope().is_none());
    }
}
