//! Lambda runtime glue.
//!
//! Maps a raw Lambda invocation onto [`handle`] and its outcome back onto
//! the invocation result. A [`HandlerOutcome::Retry`] becomes a failed
//! invocation carrying a [`RetrySignal`], which is what makes the completion
//! waiter poll again.

use std::sync::Arc;

use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use thiserror::Error;

use crate::event::InboundEvent;
use crate::handler::{
    handle, reject_malformed_event, HandlerOutcome, InvocationContext, ProviderContext,
    ResourceOperation,
};

/// Error raised to ask the waiter for another completion check.
///
/// Its message is the serialized inbound event. The waiter hands it back
/// as the timeout cause once its retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RetrySignal(pub String);

/// Handles one Lambda invocation of the provider function.
///
/// A payload that cannot be read is still reported as FAILED when it names
/// its callback and request; otherwise the invocation fails.
pub async fn handle_lambda_event(
    event: LambdaEvent<Value>,
    operation: &dyn ResourceOperation,
    ctx: &ProviderContext,
) -> Result<(), lambda_runtime::Error> {
    let (payload, context) = event.into_parts();
    let invocation = InvocationContext::from(&context);
    let inbound = match InboundEvent::from_value(payload.clone()) {
        Ok(inbound) => inbound,
        Err(error) => {
            return match reject_malformed_event(&payload, &error, ctx).await? {
                Some(_) => Ok(()),
                None => Err(Box::new(error)),
            };
        }
    };

    match handle(inbound, &invocation, operation, ctx).await? {
        HandlerOutcome::Retry(serialized) => Err(Box::new(RetrySignal(serialized))),
        HandlerOutcome::Submitted(_) | HandlerOutcome::WaiterStarted(_) => Ok(()),
    }
}

/// Runs `operation` as a provider function until the Lambda runtime shuts down.
///
/// The provider context is read from the environment once, before the first
/// invocation.
///
/// ```rust,ignore
/// use cfn_custom_resource_provider::{operation_fn, BoxError, HandlerResponse};
///
/// #[tokio::main]
/// async fn main() -> Result<(), lambda_runtime::Error> {
///     lambda_runtime::tracing::init_default_subscriber();
///     cfn_custom_resource_provider::run(operation_fn(|event, _ctx| async move {
///         Ok::<_, BoxError>(Some(HandlerResponse::new().with_physical_resource_id(event.logical_resource_id)))
///     }))
///     .await
/// }
/// ```
pub async fn run<O>(operation: O) -> Result<(), lambda_runtime::Error>
where
    O: ResourceOperation + 'static,
{
    let ctx = Arc::new(ProviderContext::from_env().await?);
    let operation = Arc::new(operation);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let ctx = Arc::clone(&ctx);
        let operation = Arc::clone(&operation);
        async move { handle_lambda_event(event, operation.as_ref(), &ctx).await }
    }))
    .await
}
