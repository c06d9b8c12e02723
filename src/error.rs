//! Error types for the custom resource provider runtime.
//!
//! Every failure that can be reported back to CloudFormation is normalized
//! into a [`ProviderError`]. Only delivery failures and malformed timeout
//! payloads escape an invocation, since there is no callback to report them to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error type returned by user-supplied resource operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for the provider runtime.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The user-supplied operation returned an error.
    #[error("{message}")]
    Operation {
        /// The error's display message
        message: String,
        /// The rendered error chain, used when stack traces are enabled
        trace: String,
    },

    /// A Delete tried to change the physical resource id of the resource.
    #[error("DELETE: cannot change the physical resource ID from \"{old}\" to \"{new}\" during deletion")]
    PhysicalIdChanged {
        /// The physical id carried by the inbound event
        old: String,
        /// The physical id returned by the operation
        new: String,
    },

    /// The inbound event could not be interpreted.
    #[error("Invalid event: {message}")]
    InvalidEvent {
        /// What was wrong with the event
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    SerDes {
        /// Error message describing the serialization failure
        message: String,
    },

    /// The response could not be delivered to the callback URL.
    #[error("Failed to deliver response: {message}")]
    Delivery {
        /// Error message describing the delivery failure
        message: String,
    },

    /// The completion waiter execution could not be started.
    #[error("Failed to start waiter: {message}")]
    WaiterStart {
        /// Error message describing the failure
        message: String,
    },

    /// Invalid provider or waiter configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the misconfiguration
        message: String,
    },
}

impl ProviderError {
    /// Wraps an error returned by a user operation, capturing its source chain.
    pub fn operation(error: BoxError) -> Self {
        Self::Operation {
            message: error.to_string(),
            trace: render_trace(error.as_ref()),
        }
    }

    /// Creates a new InvalidEvent error.
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Creates a new Delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Creates a new WaiterStart error.
    pub fn waiter_start(message: impl Into<String>) -> Self {
        Self::WaiterStart {
            message: message.into(),
        }
    }

    /// Creates a new Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if this is a Delivery error.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Self::Delivery { .. })
    }

    /// Returns true if this is a Configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Renders the reason reported to CloudFormation for this error.
    ///
    /// With `include_trace` set, operation errors report their full source
    /// chain instead of only the top-level message.
    pub fn reason(&self, include_trace: bool) -> String {
        match self {
            Self::Operation { trace, .. } if include_trace => trace.clone(),
            other => other.to_string(),
        }
    }
}

fn render_trace(error: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    if source.is_some() {
        trace.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        trace.push_str(&format!("\n    {}: {}", depth, cause));
        depth += 1;
        source = cause.source();
    }
    trace
}

/// Error object emitted in structured log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type/name
    #[serde(rename = "ErrorType")]
    pub error_type: String,
    /// The error message
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl ErrorObject {
    /// Creates a new ErrorObject.
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }
}

impl From<&ProviderError> for ErrorObject {
    fn from(error: &ProviderError) -> Self {
        let error_type = match error {
            ProviderError::Operation { .. } => "OperationError",
            ProviderError::PhysicalIdChanged { .. } => "PhysicalIdChangedError",
            ProviderError::InvalidEvent { .. } => "InvalidEventError",
            ProviderError::SerDes { .. } => "SerDesError",
            ProviderError::Delivery { .. } => "DeliveryError",
            ProviderError::WaiterStart { .. } => "WaiterStartError",
            ProviderError::Configuration { .. } => "ConfigurationError",
        };
        ErrorObject::new(error_type, error.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerDes {
            message: error.to_string(),
        }
    }
}
