//! Publisher settings: node identity, channel namespace and cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::channel::DEFAULT_NAMESPACE;

pub const DEFAULT_NODE_NAME: &str = "mobile_base/state_publisher";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PublisherConfig {
    /// Name used in logs and as the default transport client id.
    #[validate(length(min = 1, message = "Node name must not be empty"))]
    pub node_name: String,

    /// Prefix of every channel name (`<namespace>/bumper`, ...). Empty
    /// publishes on the bare field names.
    #[validate(
        length(max = 255, message = "Namespace must not exceed 255 characters"),
        custom(function = "validate_namespace")
    )]
    pub namespace: String,

    /// Target period between poll cycles, in milliseconds.
    #[validate(range(min = 1, max = 10000, message = "Period must be between 1 and 10000 ms"))]
    pub period_ms: u64,

    /// Delay before the simulated device is handed over, standing in for
    /// the host granting device access.
    #[validate(range(max = 600000, message = "Authorization delay must not exceed 600000 ms"))]
    pub authorization_delay_ms: u64,
}

/// Rejects namespaces that would produce empty name segments or wildcard
/// topics: a leading or trailing `/`, `//`, `+` or `#`.
fn validate_namespace(namespace: &str) -> Result<(), ValidationError> {
    let reason = if namespace.starts_with('/') || namespace.ends_with('/') {
        "must not start or end with '/'"
    } else if namespace.contains("//") {
        "must not contain empty segments"
    } else if namespace.contains(['+', '#']) {
        "must not contain '+' or '#'"
    } else {
        return Ok(());
    };

    let mut err = ValidationError::new("invalid_namespace");
    err.message = Some(format!("Invalid namespace '{}': {}", namespace, reason).into());
    Err(err)
}

impl PublisherConfig {
    /// Target period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Delay before the simulated device is injected.
    pub fn authorization_delay(&self) -> Duration {
        Duration::from_millis(self.authorization_delay_ms)
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            node_name: DEFAULT_NODE_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            period_ms: 10,
            authorization_delay_ms: 0,
        }
    }
}
