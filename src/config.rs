//! Runtime configuration of the provider function.
//!
//! The provider reads its configuration from the Lambda environment once at
//! startup. Whether the completion waiter is used is decided solely by the
//! presence of [`WAITER_ARN_ENV_VARIABLE`].

use crate::retry::RetryOptions;

/// Environment variable holding the ARN of the completion waiter state machine.
pub const WAITER_ARN_ENV_VARIABLE: &str = "CUSTOM_RESOURCE_WAITER_ARN";

/// Environment variable that turns error chains in failure reasons off when set to `false`.
pub const INCLUDE_STACK_TRACES_ENV_VARIABLE: &str = "CUSTOM_RESOURCE_INCLUDE_STACK_TRACES";

/// Configuration for one provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// ARN of the waiter state machine; `None` means the provider is synchronous.
    pub waiter_arn: Option<String>,
    /// Report the full error chain instead of the message in failure reasons.
    pub include_stack_traces: bool,
    /// Backoff for delivering responses to CloudFormation.
    pub delivery_retry: RetryOptions,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            waiter_arn: None,
            include_stack_traces: true,
            delivery_retry: RetryOptions::default(),
        }
    }
}

impl ProviderConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let waiter_arn = lookup(WAITER_ARN_ENV_VARIABLE).filter(|arn| !arn.is_empty());
        let include_stack_traces = lookup(INCLUDE_STACK_TRACES_ENV_VARIABLE)
            .map(|value| !value.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            waiter_arn,
            include_stack_traces,
            ..Self::default()
        }
    }

    /// Sets the waiter ARN, enabling asynchronous mode.
    pub fn with_waiter_arn(mut self, arn: impl Into<String>) -> Self {
        self.waiter_arn = Some(arn.into());
        self
    }

    /// Sets whether failure reasons include the error chain.
    pub fn with_stack_traces(mut self, include: bool) -> Self {
        self.include_stack_traces = include;
        self
    }

    /// Sets the delivery backoff.
    pub fn with_delivery_retry(mut self, retry: RetryOptions) -> Self {
        self.delivery_retry = retry;
        self
    }

    /// Returns true if a completion waiter is configured.
    pub fn waiter_enabled(&self) -> bool {
        self.waiter_arn.is_some()
    }
}
