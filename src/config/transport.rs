//! MQTT transport settings.
//!
//! ```toml
//! [transport]
//! base_topic = "robot-1"
//! host = "mqtt.local"
//! port = 1883
//! qos = 0
//! retain = false
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MqttConfig {
    /// Prefix for every channel topic. Empty disables it.
    #[validate(length(max = 255, message = "Base topic must not exceed 255 characters"))]
    pub base_topic: String,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client id; empty derives one from the node name.
    #[validate(length(max = 64, message = "Client id must not exceed 64 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[validate(range(min = 5, max = 3600, message = "Keep alive must be between 5 and 3600 seconds"))]
    pub keep_alive: u64,

    pub clean_session: bool,

    /// QoS for status publishes: 0, 1 or 2.
    #[validate(range(max = 2, message = "QoS must be 0, 1 or 2"))]
    pub qos: u8,

    pub retain: bool,

    /// Capacity of the client request queue.
    #[validate(range(min = 1, max = 10000, message = "Request channel capacity must be between 1 and 10000"))]
    pub request_channel_capacity: usize,

    /// Seconds to wait before reconnecting after a connection error.
    #[validate(range(min = 1, max = 300, message = "Reconnect delay must be between 1 and 300 seconds"))]
    pub reconnect_delay: u64,
}

impl MqttConfig {
    /// Keep-alive interval as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            base_topic: String::new(),
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            // Status arrives every period; losing one sample is harmless.
            qos: 0,
            retain: false,
            request_channel_capacity: 100,
            reconnect_delay: 1,
        }
    }
}
