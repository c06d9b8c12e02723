//! Synchronous Provider Example
//!
//! A provider whose operation completes within a single invocation.

use cfn_custom_resource_provider::{
    operation_fn, BoxError, HandlerResponse, InvocationContext, LifecycleEvent, RequestType,
};
use serde_json::json;

/// Derives a greeting from the resource properties.
pub async fn on_event(
    event: LifecycleEvent,
    _ctx: InvocationContext,
) -> Result<Option<HandlerResponse>, BoxError> {
    let name = event
        .resource_properties
        .get("Name")
        .and_then(|value| value.as_str())
        .ok_or("missing required property Name")?
        .to_string();

    match event.request_type {
        RequestType::Create | RequestType::Update => {
            tracing::info!(name = %name, "rendering greeting");
            Ok(Some(
                HandlerResponse::new()
                    .with_physical_resource_id(format!("greeting-{}", name))
                    .with_data(json!({ "Greeting": format!("Hello, {}!", name) })),
            ))
        }
        RequestType::Delete => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    lambda_runtime::tracing::init_default_subscriber();

    cfn_custom_resource_provider::run(operation_fn(on_event)).await
}
