//! Logging capability used by the handler.
//!
//! The handler logs through a [`Logger`] trait object so tests can capture
//! log lines. [`TracingLogger`] forwards to `tracing` with the request's
//! identifiers as structured fields.

use crate::event::LifecycleEvent;
use crate::response::Response;

/// Identifiers attached to every log line of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogInfo {
    pub stack_id: Option<String>,
    pub request_id: Option<String>,
    pub logical_resource_id: Option<String>,
    pub request_type: Option<String>,
}

impl LogInfo {
    /// Creates an empty LogInfo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&LifecycleEvent> for LogInfo {
    fn from(event: &LifecycleEvent) -> Self {
        Self {
            stack_id: Some(event.stack_id.clone()),
            request_id: Some(event.request_id.clone()),
            logical_resource_id: Some(event.logical_resource_id.clone()),
            request_type: Some(event.request_type.to_string()),
        }
    }
}

impl From<&Response> for LogInfo {
    fn from(response: &Response) -> Self {
        Self {
            stack_id: Some(response.stack_id.clone()),
            request_id: Some(response.request_id.clone()),
            logical_resource_id: Some(response.logical_resource_id.clone()),
            request_type: Some(response.request_type.to_string()),
        }
    }
}

/// Sink for handler log messages.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, info: &LogInfo);
    fn info(&self, message: &str, info: &LogInfo);
    fn warn(&self, message: &str, info: &LogInfo);
    fn error(&self, message: &str, info: &LogInfo);
}

/// Default logger backed by `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

macro_rules! log_with_info {
    ($level:ident, $message:expr, $info:expr) => {
        tracing::$level!(
            stack_id = $info.stack_id.as_deref(),
            request_id = $info.request_id.as_deref(),
            logical_resource_id = $info.logical_resource_id.as_deref(),
            request_type = $info.request_type.as_deref(),
            "{}",
            $message
        )
    };
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str, info: &LogInfo) {
        log_with_info!(debug, message, info);
    }

    fn info(&self, message: &str, info: &LogInfo) {
        log_with_info!(info, message, info);
    }

    fn warn(&self, message: &str, info: &LogInfo) {
        log_with_info!(warn, message, info);
    }

    fn error(&self, message: &str, info: &LogInfo) {
        log_with_info!(error, message, info);
    }
}
