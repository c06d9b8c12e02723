//! Completion waiter state machine definition.
//!
//! The waiter is a two-state Step Functions workflow. `isComplete-task`
//! invokes the provider function and retries on any error at a fixed
//! interval; when the retries run out, `onTimeout-task` invokes the provider
//! one last time with the failure cause so it can report the timeout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::duration::Duration;
use crate::error::ProviderError;

/// Default total time the waiter keeps polling.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_minutes(30);

/// Default interval between completion checks.
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_seconds(30);

/// Name of the polling state.
pub const IS_COMPLETE_STATE: &str = "isComplete-task";

/// Name of the timeout state.
pub const ON_TIMEOUT_STATE: &str = "onTimeout-task";

const ALL_ERRORS: &str = "States.ALL";

/// Polling cadence of the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u64,
    pub backoff_rate: u32,
}

impl RetryPolicy {
    /// Derives the policy from a total timeout and a query interval.
    ///
    /// Fails unless the timeout is an exact multiple of the interval.
    ///
    /// ```
    /// use cfn_custom_resource_provider::{Duration, RetryPolicy};
    ///
    /// let policy = RetryPolicy::calculate(None, None).unwrap();
    /// assert_eq!(policy.max_attempts, 60);
    /// assert_eq!(policy.backoff_rate, 1);
    ///
    /// let invalid = RetryPolicy::calculate(
    ///     Some(Duration::from_seconds(100)),
    ///     Some(Duration::from_seconds(30)),
    /// );
    /// assert!(invalid.is_err());
    /// ```
    pub fn calculate(
        total_timeout: Option<Duration>,
        query_interval: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let total_timeout = total_timeout.unwrap_or(DEFAULT_TOTAL_TIMEOUT);
        let interval = query_interval.unwrap_or(DEFAULT_QUERY_INTERVAL);

        if interval.is_zero() {
            return Err(ProviderError::configuration(
                "queryInterval must be at least one second",
            ));
        }
        if total_timeout.to_seconds() % interval.to_seconds() != 0 {
            return Err(ProviderError::configuration(format!(
                "Cannot determine retry count since totalTimeout={}s is not integrally dividable by queryInterval={}s",
                total_timeout.to_seconds(),
                interval.to_seconds()
            )));
        }

        Ok(Self {
            interval,
            max_attempts: total_timeout.to_seconds() / interval.to_seconds(),
            backoff_rate: 1,
        })
    }
}

/// Execution history log level of the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WaiterLogLevel {
    Off,
    All,
    #[default]
    Error,
    Fatal,
}

/// Logging options for the waiter state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterLogOptions {
    /// Include execution input and output in log events.
    pub include_execution_data: bool,
    pub level: WaiterLogLevel,
    /// Retention of the waiter log group.
    pub retention: Duration,
}

impl Default for WaiterLogOptions {
    fn default() -> Self {
        Self {
            include_execution_data: false,
            level: WaiterLogLevel::default(),
            retention: Duration::from_days(60),
        }
    }
}

/// Definition-time settings of the waiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaiterConfig {
    /// How long the waiter polls before giving up. Defaults to 30 minutes.
    pub total_timeout: Option<Duration>,
    /// How often completion is checked. Defaults to 30 seconds.
    pub query_interval: Option<Duration>,
    pub log_options: Option<WaiterLogOptions>,
    /// Skip creating the waiter log group.
    pub disable_logs: bool,
}

impl WaiterConfig {
    /// Returns true if any option differs from the defaults.
    pub fn is_customized(&self) -> bool {
        self != &Self::default()
    }

    /// Builds the state machine definition invoking `handler_arn`.
    pub fn definition(&self, handler_arn: &str) -> Result<StateMachineDefinition, ProviderError> {
        let retry = RetryPolicy::calculate(self.total_timeout, self.query_interval)?;
        Ok(StateMachineDefinition::waiter(handler_arn, &retry))
    }

    /// Builds the log group and logging configuration for a waiter, unless disabled.
    pub fn logging(&self, waiter_name: &str) -> Option<WaiterLogging> {
        if self.disable_logs {
            return None;
        }
        let options = self.log_options.clone().unwrap_or_default();
        let log_group_name = format!("/cdk/custom-resource/waiter/{}", waiter_name);
        Some(WaiterLogging {
            log_group: LogGroup {
                log_group_name: log_group_name.clone(),
                retention_in_days: options.retention.to_days(),
            },
            configuration: LoggingConfiguration {
                destinations: vec![LogDestination {
                    cloud_watch_logs_log_group: log_group_name,
                    include_execution_data: options.include_execution_data,
                    level: options.level,
                }],
            },
        })
    }
}

/// Amazon States Language document of the waiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineDefinition {
    pub start_at: String,
    pub states: BTreeMap<String, TaskState>,
}

/// A `Task` state invoking the provider function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(rename = "Type")]
    pub state_type: String,
    pub resource: String,
    pub end: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<Retrier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<Catcher>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Retrier {
    pub error_equals: Vec<String>,
    pub interval_seconds: u64,
    pub max_attempts: u64,
    pub backoff_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Catcher {
    pub error_equals: Vec<String>,
    pub next: String,
}

impl StateMachineDefinition {
    fn waiter(handler_arn: &str, retry: &RetryPolicy) -> Self {
        let is_complete = TaskState {
            state_type: "Task".to_string(),
            resource: handler_arn.to_string(),
            end: true,
            retry: vec![Retrier {
                error_equals: vec![ALL_ERRORS.to_string()],
                interval_seconds: retry.interval.to_seconds(),
                max_attempts: retry.max_attempts,
                backoff_rate: retry.backoff_rate,
            }],
            catch: vec![Catcher {
                error_equals: vec![ALL_ERRORS.to_string()],
                next: ON_TIMEOUT_STATE.to_string(),
            }],
        };
        let on_timeout = TaskState {
            state_type: "Task".to_string(),
            resource: handler_arn.to_string(),
            end: true,
            retry: Vec::new(),
            catch: Vec::new(),
        };

        let mut states = BTreeMap::new();
        states.insert(IS_COMPLETE_STATE.to_string(), is_complete);
        states.insert(ON_TIMEOUT_STATE.to_string(), on_timeout);
        Self {
            start_at: IS_COMPLETE_STATE.to_string(),
            states,
        }
    }

    /// Renders the definition as the JSON string Step Functions expects.
    pub fn to_json_string(&self) -> Result<String, ProviderError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Log group backing the waiter's execution logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogGroup {
    pub log_group_name: String,
    pub retention_in_days: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfiguration {
    pub destinations: Vec<LogDestination>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogDestination {
    #[serde(rename = "CloudWatchLogsLogGroup")]
    pub cloud_watch_logs_log_group: String,
    pub include_execution_data: bool,
    pub level: WaiterLogLevel,
}

/// Log group plus the state machine's `LoggingConfiguration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterLogging {
    pub log_group: LogGroup,
    pub configuration: LoggingConfiguration,
}
