//! Merged responses and the CloudFormation response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::event::{
    deserialize_present, HandlerResponse, LifecycleEvent, RequestType, COMPLETE_KEY, WAITING_KEY,
};

/// Physical id reported for a Create that failed before producing a resource.
///
/// CloudFormation follows a failed Create with a Delete carrying this id;
/// that Delete is acknowledged without running the operation.
pub const CREATE_FAILED_PHYSICAL_ID_MARKER: &str =
    "AWSCDK::CustomResourceProviderFramework::CREATE_FAILED";

/// Physical id reported when a response has none at all.
pub const MISSING_PHYSICAL_ID_MARKER: &str =
    "AWSCDK::CustomResourceProviderFramework::MISSING_PHYSICAL_ID";

const RESERVED_KEYS: &[&str] = &[
    "RequestType",
    "StackId",
    "RequestId",
    "LogicalResourceId",
    "PhysicalResourceId",
    "ResponseURL",
    "ResourceProperties",
    "Data",
    "Reason",
    "NoEcho",
    COMPLETE_KEY,
    WAITING_KEY,
];

/// An inbound event merged with the operation's response.
///
/// This is both what gets submitted to CloudFormation and what the waiter
/// sends back as a completion-check request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub request_type: RequestType,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_waiting: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Sets the reason, replacing any reason carried over from the operation.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<LifecycleEvent> for Response {
    /// Promotes response fields carried in the event (from an earlier merge)
    /// back into typed fields.
    fn from(event: LifecycleEvent) -> Self {
        let mut extra = event.extra;
        Self {
            data: take_field(&mut extra, "Data"),
            reason: take_field(&mut extra, "Reason"),
            no_echo: take_field(&mut extra, "NoEcho"),
            is_complete: take_field(&mut extra, COMPLETE_KEY),
            request_type: event.request_type,
            stack_id: event.stack_id,
            request_id: event.request_id,
            logical_resource_id: event.logical_resource_id,
            physical_resource_id: event.physical_resource_id,
            response_url: event.response_url,
            resource_properties: event.resource_properties,
            is_waiting: event.is_waiting,
            extra,
        }
    }
}

fn take_field<T: DeserializeOwned>(extra: &mut Map<String, Value>, key: &str) -> Option<T> {
    extra
        .remove(key)
        .and_then(|value| serde_json::from_value(value).ok())
}

/// Merges an operation's response into the event it was invoked with.
///
/// Response fields take precedence. The physical id falls back to the
/// event's id and then to the request id. A Delete must keep the event's
/// physical id.
pub fn render_response(
    event: &LifecycleEvent,
    handler_response: Option<HandlerResponse>,
) -> Result<Response, ProviderError> {
    let handler_response = handler_response.unwrap_or_default();

    let physical_resource_id = handler_response
        .physical_resource_id
        .clone()
        .or_else(|| event.physical_resource_id.clone())
        .unwrap_or_else(|| event.request_id.clone());

    if event.request_type == RequestType::Delete
        && event.physical_resource_id.as_deref() != Some(physical_resource_id.as_str())
    {
        return Err(ProviderError::PhysicalIdChanged {
            old: display_id(event.physical_resource_id.as_deref()),
            new: display_id(handler_response.physical_resource_id.as_deref()),
        });
    }

    let mut merged = Response::from(event.clone());
    merged.physical_resource_id = Some(physical_resource_id);
    if handler_response.data.is_some() {
        merged.data = handler_response.data;
    }
    if handler_response.reason.is_some() {
        merged.reason = handler_response.reason;
    }
    if handler_response.no_echo.is_some() {
        merged.no_echo = handler_response.no_echo;
    }
    if handler_response.is_complete.is_some() {
        merged.is_complete = handler_response.is_complete;
    }
    for (key, value) in handler_response.extra {
        if !RESERVED_KEYS.contains(&key.as_str()) {
            merged.extra.insert(key, value);
        }
    }
    Ok(merged)
}

fn display_id(id: Option<&str>) -> String {
    id.unwrap_or("undefined").to_string()
}

/// Outcome reported to CloudFormation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// The JSON document PUT to the pre-signed `ResponseURL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    pub reason: String,
    pub stack_id: String,
    pub request_id: String,
    pub physical_resource_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Builds the envelope for a response.
    ///
    /// The reason defaults to the status string, and an absent or empty
    /// physical id is replaced by [`MISSING_PHYSICAL_ID_MARKER`].
    pub fn new(status: ResponseStatus, response: &Response) -> Self {
        let physical_resource_id = response
            .physical_resource_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(MISSING_PHYSICAL_ID_MARKER)
            .to_string();

        Self {
            status,
            reason: response
                .reason
                .clone()
                .unwrap_or_else(|| status.to_string()),
            stack_id: response.stack_id.clone(),
            request_id: response.request_id.clone(),
            physical_resource_id,
            logical_resource_id: response.logical_resource_id.clone(),
            no_echo: response.no_echo,
            data: response.data.clone(),
        }
    }
}
