//! Definition-time settings of a provider function.
//!
//! Renders what the deployment tooling needs to wire a provider: the
//! function's environment, and for asynchronous providers the waiter
//! definition and its logging. All validation happens here, before anything
//! is deployed.

use std::collections::BTreeMap;

use crate::config::WAITER_ARN_ENV_VARIABLE;
use crate::error::ProviderError;
use crate::waiter::{StateMachineDefinition, WaiterConfig, WaiterLogging};

/// Settings of a provider function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProps {
    /// The operation may need more than one invocation to complete.
    pub handle_async: bool,
    /// User environment variables of the function.
    pub environment: BTreeMap<String, String>,
    /// Waiter settings; only meaningful when `handle_async` is set.
    pub waiter: WaiterConfig,
}

/// Names of the deployed function and waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTarget {
    pub handler_arn: String,
    pub waiter_arn: String,
    pub waiter_name: String,
}

/// Rendered provider definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefinition {
    /// Function environment, sorted by key; `None` when empty.
    pub environment: Option<BTreeMap<String, String>>,
    pub waiter_definition: Option<StateMachineDefinition>,
    pub waiter_logging: Option<WaiterLogging>,
    pub warnings: Vec<String>,
}

impl ProviderDefinition {
    /// Renders the definition for `props`.
    ///
    /// Fails if the waiter's retry policy is invalid.
    pub fn build(props: &ProviderProps, target: &ProviderTarget) -> Result<Self, ProviderError> {
        let mut warnings = Vec::new();
        let mut environment = props.environment.clone();
        let mut waiter_definition = None;
        let mut waiter_logging = None;

        if props.handle_async {
            waiter_definition = Some(props.waiter.definition(&target.handler_arn)?);
            waiter_logging = props.waiter.logging(&target.waiter_name);
            environment.insert(
                WAITER_ARN_ENV_VARIABLE.to_string(),
                target.waiter_arn.clone(),
            );
        } else if props.waiter.is_customized() {
            warnings.push(
                "waiter options (total timeout, query interval, log options, disabled logs) only apply when handle_async is set"
                    .to_string(),
            );
        }

        Ok(Self {
            environment: render_environment(environment),
            waiter_definition,
            waiter_logging,
            warnings,
        })
    }
}

fn render_environment(mut environment: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if environment.is_empty() {
        return None;
    }
    environment.insert("AWS_STS_REGIONAL_ENDPOINTS".to_string(), "regional".to_string());
    Some(environment)
}
