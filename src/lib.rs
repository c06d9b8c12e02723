//! # CloudFormation Custom Resource Provider Runtime
//!
//! Runtime for AWS Lambda functions that back CloudFormation custom
//! resources, with optional support for operations that take longer than a
//! single invocation.
//!
//! ## Overview
//!
//! A provider function receives a lifecycle event (Create, Update or
//! Delete), runs a user-supplied [`ResourceOperation`], and reports the
//! result to the pre-signed `ResponseURL` carried by the event.
//!
//! Asynchronous operations declare completion with an `IsComplete` field.
//! When an operation reports `IsComplete: false`, the runtime starts a
//! completion waiter: a Step Functions state machine that re-invokes the
//! provider on a fixed interval until the operation reports `true`, or until
//! the waiter's budget runs out and the resource is failed with
//! `Operation timed out`.
//!
//! ### Key Features
//!
//! - **Explicit capabilities**: response delivery, the waiter client and
//!   logging are passed through a [`ProviderContext`], so handlers can be
//!   tested with fakes.
//! - **Strict completion protocol**: only exactly `true` or exactly `false`
//!   are accepted for `IsComplete`; anything else fails the resource.
//! - **Safe failed creates**: a Create that fails before producing a
//!   resource reports a marker physical id, and the Delete CloudFormation
//!   sends afterwards is acknowledged without running the operation.
//! - **Retried delivery**: responses are delivered with randomized
//!   exponential backoff.
//! - **Definition rendering**: [`ProviderDefinition`] renders the waiter's
//!   state machine, its logging and the function environment.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use cfn_custom_resource_provider::{operation_fn, BoxError, HandlerResponse, LifecycleEvent, RequestType};
//!
//! async fn on_event(event: LifecycleEvent) -> Result<Option<HandlerResponse>, BoxError> {
//!     match event.request_type {
//!         RequestType::Create | RequestType::Update => Ok(Some(
//!             HandlerResponse::new()
//!                 .with_physical_resource_id("my-resource")
//!                 .with_complete(false),
//!         )),
//!         RequestType::Delete => Ok(None),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     lambda_runtime::tracing::init_default_subscriber();
//!     cfn_custom_resource_provider::run(operation_fn(|event, _ctx| on_event(event))).await
//! }
//! ```
//!
//! ## Configuration
//!
//! | Variable                                | Effect                                                   |
//! |-----------------------------------------|----------------------------------------------------------|
//! | `CUSTOM_RESOURCE_WAITER_ARN`            | Enables asynchronous mode using this state machine       |
//! | `CUSTOM_RESOURCE_INCLUDE_STACK_TRACES`  | `false` reports only the error message in failure reasons |

pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod handler;
pub mod lambda;
pub mod logger;
pub mod provider;
pub mod response;
pub mod retry;
pub mod waiter;

pub use client::{
    HttpResponseSender, ResponseSender, SharedResponseSender, SharedWaiterClient,
    StartExecutionRequest, StartExecutionResponse, StepFunctionsClientConfig,
    StepFunctionsWaiterClient, WaiterClient,
};
pub use config::{ProviderConfig, INCLUDE_STACK_TRACES_ENV_VARIABLE, WAITER_ARN_ENV_VARIABLE};
pub use duration::Duration;
pub use error::{BoxError, ErrorObject, ProviderError};
pub use event::{
    Completion, HandlerResponse, InboundEvent, LifecycleEvent, RequestType, TimeoutEvent,
};
pub use handler::{
    handle, operation_fn, reject_malformed_event, submit_response, FnOperation, HandlerOutcome,
    InvocationContext, ProviderContext, ResourceOperation,
};
pub use lambda::{handle_lambda_event, run, RetrySignal};
pub use logger::{LogInfo, Logger, TracingLogger};
pub use provider::{ProviderDefinition, ProviderProps, ProviderTarget};
pub use response::{
    render_response, Response, ResponseEnvelope, ResponseStatus, CREATE_FAILED_PHYSICAL_ID_MARKER,
    MISSING_PHYSICAL_ID_MARKER,
};
pub use retry::{with_retries, RetryOptions};
pub use waiter::{
    RetryPolicy, StateMachineDefinition, WaiterConfig, WaiterLogLevel, WaiterLogOptions,
    WaiterLogging,
};
