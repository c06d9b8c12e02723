//! Inbound event types.
//!
//! The provider function receives two kinds of payloads: CloudFormation
//! lifecycle events (possibly re-sent by the completion waiter with an
//! `IsWaiting` marker), and the timeout escalation the waiter sends once its
//! retry budget is exhausted.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Field a handler response uses to report completion of an async operation.
pub const COMPLETE_KEY: &str = "IsComplete";

/// Field marking an event as a completion check sent by the waiter.
pub const WAITING_KEY: &str = "IsWaiting";

/// Placeholder replacing the callback URL in events handed to user code.
pub const SANITIZED_RESPONSE_URL: &str = "...";

/// CloudFormation lifecycle request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// A CloudFormation custom resource lifecycle event.
///
/// Fields the runtime does not interpret (`ServiceToken`, `ResourceType`,
/// `OldResourceProperties`, and anything merged in by a previous invocation)
/// are kept in [`extra`](Self::extra) and written back unchanged whenever the
/// event is re-serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
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
    /// Present only on completion checks sent by the waiter. Only presence
    /// matters; an explicit `null` still marks a completion check.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_waiting: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Deserializes a field that is meaningful by presence alone, keeping `null`.
pub(crate) fn deserialize_present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl LifecycleEvent {
    /// Returns a copy of this event with the callback URL masked.
    ///
    /// This is the form that is logged and passed to user operations.
    pub fn sanitized(&self) -> Self {
        Self {
            response_url: SANITIZED_RESPONSE_URL.to_string(),
            ..self.clone()
        }
    }

    /// Returns true if the waiter sent this event as a completion check.
    pub fn is_completion_check(&self) -> bool {
        self.is_waiting.is_some()
    }
}

/// Payload sent by the waiter's timeout state after retries are exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutEvent {
    #[serde(rename = "Cause")]
    pub cause: String,
}

#[derive(Debug, Deserialize)]
struct TimeoutCause {
    #[serde(rename = "errorMessage")]
    error_message: String,
}

impl TimeoutEvent {
    /// Recovers the serialized completion-check request from the failure cause.
    ///
    /// The cause is the JSON error record of the last failed retry, whose
    /// `errorMessage` is the serialized event carried by the retry signal.
    pub fn completion_request<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProviderError> {
        let cause: TimeoutCause = serde_json::from_str(&self.cause).map_err(|e| {
            ProviderError::invalid_event(format!("timeout cause is not an error record: {}", e))
        })?;
        serde_json::from_str(&cause.error_message).map_err(|e| {
            ProviderError::invalid_event(format!(
                "timeout cause does not carry a completion request: {}",
                e
            ))
        })
    }
}

/// Any payload the provider function can be invoked with.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Lifecycle(LifecycleEvent),
    Timeout(TimeoutEvent),
}

impl InboundEvent {
    /// Classifies a raw payload. Anything with a `Cause` field is a timeout.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.get("Cause").is_some() {
            Ok(Self::Timeout(serde_json::from_value(value)?))
        } else {
            Ok(Self::Lifecycle(serde_json::from_value(value)?))
        }
    }
}

impl<'de> Deserialize<'de> for InboundEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

/// Result returned by a user resource operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HandlerResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    /// Kept as raw JSON: only exactly `true` or exactly `false` are meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HandlerResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the physical resource id.
    pub fn with_physical_resource_id(mut self, id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(id.into());
        self
    }

    /// Sets the output data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the human-readable reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks the output data as secret.
    pub fn with_no_echo(mut self, no_echo: bool) -> Self {
        self.no_echo = Some(no_echo);
        self
    }

    /// Reports whether an async operation has completed.
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.is_complete = Some(Value::Bool(complete));
        self
    }
}

/// Completion state declared by a merged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `IsComplete` is exactly `true`.
    Complete,
    /// `IsComplete` is exactly `false`.
    Pending,
    /// `IsComplete` is missing or not a boolean.
    Undeclared,
}

impl Completion {
    /// Classifies a raw `IsComplete` value without any truthiness coercion.
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(true)) => Self::Complete,
            Some(Value::Bool(false)) => Self::Pending,
            _ => Self::Undeclared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_event_json() -> Value {
        json!({
            "RequestType": "Create",
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:provider",
            "ResponseURL": "https://cloudformation-custom-resource-response.s3.amazonaws.com/abc",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/guid",
            "RequestId": "req-1",
            "LogicalResourceId": "MyResource",
            "ResourceType": "Custom::MyResource",
            "ResourceProperties": {"Key": "Value"}
        })
    }

    #[test]
    fn test_lifecycle_event_deserialization() {
        let event = match InboundEvent::from_value(create_event_json()).unwrap() {
            InboundEvent::Lifecycle(event) => event,
            other => panic!("expected lifecycle event, got {:?}", other),
        };
        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.request_id, "req-1");
        assert!(event.physical_resource_id.is_none());
        assert!(!event.is_completion_check());
        assert_eq!(event.resource_properties["Key"], "Value");
        assert_eq!(event.extra["ResourceType"], "Custom::MyResource");
    }

    #[test]
    fn test_unknown_fields_survive_reserialization() {
        let event: LifecycleEvent = serde_json::from_value(create_event_json()).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, create_event_json());
    }

    #[test]
    fn test_sanitized_masks_response_url_only() {
        let event: LifecycleEvent = serde_json::from_value(create_event_json()).unwrap();
        let sanitized = event.sanitized();
        assert_eq!(sanitized.response_url, "...");
        assert_eq!(sanitized.request_id, event.request_id);
        assert_eq!(sanitized.extra, event.extra);
    }

    #[test]
    fn test_waiting_marker_is_checked_by_presence() {
        let mut value = create_event_json();
        value["IsWaiting"] = Value::Null;
        let event: LifecycleEvent = serde_json::from_value(value.clone()).unwrap();
        assert!(event.is_completion_check());
        assert_eq!(serde_json::to_value(&event).unwrap(), value);

        value["IsWaiting"] = json!("yes");
        let event: LifecycleEvent = serde_json::from_value(value).unwrap();
        assert!(event.is_completion_check());

        let event: LifecycleEvent = serde_json::from_value(create_event_json()).unwrap();
        assert!(event.is_waiting.is_none());
    }

    #[test]
    fn test_cause_field_marks_timeout() {
        let inbound: InboundEvent = serde_json::from_value(json!({"Cause": "{}"})).unwrap();
        assert!(matches!(inbound, InboundEvent::Timeout(_)));
    }

    #[test]
    fn test_timeout_completion_request() {
        let original = create_event_json();
        let cause = json!({
            "errorType": "Error",
            "errorMessage": original.to_string(),
        });
        let timeout = TimeoutEvent {
            cause: cause.to_string(),
        };
        let request: LifecycleEvent = timeout.completion_request().unwrap();
        assert_eq!(request.request_id, "req-1");
        assert_eq!(request.logical_resource_id, "MyResource");
    }

    #[test]
    fn test_timeout_with_garbage_cause_is_invalid() {
        let timeout = TimeoutEvent {
            cause: "States.Timeout".to_string(),
        };
        let result: Result<LifecycleEvent, _> = timeout.completion_request();
        assert!(matches!(result, Err(ProviderError::InvalidEvent { .. })));
    }

    #[test]
    fn test_missing_request_type_is_rejected() {
        let result = InboundEvent::from_value(json!({"StackId": "s"}));
        assert!(matches!(result, Err(ProviderError::SerDes { .. })));
    }

    #[test]
    fn test_completion_is_strict() {
        assert_eq!(Completion::of(Some(&json!(true))), Completion::Complete);
        assert_eq!(Completion::of(Some(&json!(false))), Completion::Pending);
        assert_eq!(Completion::of(Some(&json!("true"))), Completion::Undeclared);
        assert_eq!(Completion::of(Some(&json!(0))), Completion::Undeclared);
        assert_eq!(Completion::of(Some(&Value::Null)), Completion::Undeclared);
        assert_eq!(Completion::of(None), Completion::Undeclared);
    }

    #[test]
    fn test_handler_response_builder() {
        let response = HandlerResponse::new()
            .with_physical_resource_id("X")
            .with_complete(false);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"PhysicalResourceId": "X", "IsComplete": false}));
    }
}
