//! Settings for the simulated base device.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeviceConfig {
    /// Battery level reported by the first read.
    pub initial_battery: u8,

    /// Reads per one-unit battery change.
    #[validate(range(min = 1, message = "drain_every must be at least 1"))]
    pub drain_every: u32,

    /// Fail every read after this many successful ones. Unset means never.
    pub fail_after: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            initial_battery: 160,
            drain_every: 100,
            fail_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_drain_rate_is_rejected() {
        let config: DeviceConfig = toml::from_str("drain_every = 0").unwrap();
        assert!(config.validate().is_err());
        assert!(DeviceConfig::default().validate().is_ok());
    }
}
