//! Asynchronous Provider Example
//!
//! A provider whose operation outlives a single invocation. The first
//! invocation starts the work and reports `IsComplete: false`; the completion
//! waiter then re-invokes the function until it reports `IsComplete: true`.
//!
//! Deploy it with `CUSTOM_RESOURCE_WAITER_ARN` set to the waiter's ARN.

use std::time::{SystemTime, UNIX_EPOCH};

use cfn_custom_resource_provider::{
    operation_fn, BoxError, HandlerResponse, InvocationContext, LifecycleEvent, RequestType,
};
use serde_json::json;

const PROVISIONING_SECONDS: u64 = 120;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Pretends to provision a resource that becomes ready two minutes after it is requested.
pub async fn on_event(
    event: LifecycleEvent,
    _ctx: InvocationContext,
) -> Result<Option<HandlerResponse>, BoxError> {
    if event.request_type == RequestType::Delete {
        return Ok(Some(HandlerResponse::new().with_complete(true)));
    }

    if !event.is_completion_check() {
        let ready_at = now() + PROVISIONING_SECONDS;
        tracing::info!(ready_at, "provisioning started");
        return Ok(Some(
            HandlerResponse::new()
                .with_physical_resource_id(format!("resource-{}", ready_at))
                .with_data(json!({ "ReadyAt": ready_at }))
                .with_complete(false),
        ));
    }

    // Completion checks carry the data returned by the first invocation.
    let ready_at = event
        .extra
        .get("Data")
        .and_then(|data| data.get("ReadyAt"))
        .and_then(|value| value.as_u64())
        .ok_or("completion check lost its ReadyAt marker")?;

    let complete = now() >= ready_at;
    tracing::info!(ready_at, complete, "completion check");
    Ok(Some(HandlerResponse::new().with_complete(complete)))
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    lambda_runtime::tracing::init_default_subscriber();

    cfn_custom_resource_provider::run(operation_fn(on_event)).await
}
