//! MQTT-backed channel registry.
//!
//! Every channel maps to the topic `<base_topic>/<channel name>`; each
//! publish sends the status value as a single-byte payload.

use std::sync::Arc;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::connection::MqttConnection;
use crate::{
    config::transport::MqttConfig,
    core::{
        channel::{Channel, ChannelRegistry, ChannelSink},
        error::{TransportError, TransportResult},
    },
};

/// Maps a numeric QoS level to the rumqttc enum.
pub fn qos_from_level(level: u8) -> TransportResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransportError::Registration {
            channel: "*".into(),
            reason: format!("Invalid QoS value {}, must be 0, 1, or 2", other),
        }),
    }
}

/// Client id from the configuration, or `<node name>-<uuid>` when empty.
pub fn client_id(config: &MqttConfig, node_name: &str) -> String {
    if config.client_id.is_empty() {
        format!("{}-{}", node_name.replace('/', "_"), Uuid::new_v4().simple())
    } else {
        config.client_id.clone()
    }
}

/// Builds the MQTT client and its event loop from configuration.
pub fn build_client(config: &MqttConfig, node_name: &str) -> (AsyncClient, EventLoop) {
    let id = client_id(config, node_name);
    debug!("MQTT client id: {}", id);

    let mut opts = MqttOptions::new(id, config.host.clone(), config.port);
    opts.set_keep_alive(config.keep_alive());
    opts.set_clean_session(config.clean_session);
    AsyncClient::new(opts, config.request_channel_capacity)
}

/// Connects the MQTT transport: returns the channel registry and the
/// connection driver that must be spawned to move packets.
///
/// # Errors
///
/// Returns `TransportError::Registration` if the QoS level is invalid.
pub fn connect(
    config: &MqttConfig,
    node_name: &str,
    cancel: CancellationToken,
) -> TransportResult<(MqttChannelRegistry, MqttConnection)> {
    info!("MQTT transport: {}:{}", config.host, config.port);
    let (client, event_loop) = build_client(config, node_name);
    let registry = MqttChannelRegistry::new(client.clone(), config)?;
    let connection = MqttConnection::new(client, event_loop, config.reconnect_delay(), cancel);
    Ok((registry, connection))
}

/// Creates one [`MqttChannelSink`] per channel.
#[derive(Clone)]
pub struct MqttChannelRegistry {
    client: AsyncClient,
    base_topic: String,
    qos: QoS,
    retain: bool,
}

impl MqttChannelRegistry {
    /// Creates a registry publishing through `client`.
    ///
    /// # Arguments
    ///
    /// * `client` - Connected or connecting rumqttc client
    /// * `config` - Supplies the base topic, QoS and retain flag
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Registration` if the configured QoS is not
    /// 0, 1 or 2.
    pub fn new(client: AsyncClient, config: &MqttConfig) -> TransportResult<Self> {
        Ok(Self {
            client,
            base_topic: config.base_topic.clone(),
            qos: qos_from_level(config.qos)?,
            retain: config.retain,
        })
    }

    /// Full topic for a channel, with the base topic applied.
    pub fn topic_for(&self, channel: &Channel) -> String {
        if self.base_topic.is_empty() {
            channel.name().to_string()
        } else {
            format!(
                "{}/{}",
                self.base_topic.trim_end_matches('/'),
                channel.name().trim_start_matches('/')
            )
        }
    }
}

impl ChannelRegistry for MqttChannelRegistry {
    fn create_sink(&self, channel: &Channel) -> TransportResult<Arc<dyn ChannelSink>> {
        let topic = self.topic_for(channel);
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(TransportError::Registration {
                channel: channel.name().to_string(),
                reason: format!("'{}' is not a valid publish topic", topic),
            });
        }

        debug!("Channel {} -> MQTT topic {}", channel, topic);
        Ok(Arc::new(MqttChannelSink {
            client: self.client.clone(),
            topic,
            qos: self.qos,
            retain: self.retain,
        }))
    }
}

/// Publishes one status byte per call on a fixed topic.
pub struct MqttChannelSink {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    retain: bool,
}

impl MqttChannelSink {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait::async_trait]
impl ChannelSink for MqttChannelSink {
    async fn publish(&self, value: u8) -> TransportResult<()> {
        self.client
            .publish(self.topic.as_str(), self.qos, self.retain, vec![value])
            .await
            .map_err(|e| TransportError::Publish {
                channel: self.topic.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        channel::{ChannelTable, DEFAULT_NAMESPACE},
        status::StatusField,
    };

    fn config(base_topic: &str) -> MqttConfig {
        MqttConfig {
            base_topic: base_topic.into(),
            client_id: "base-status-test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_from_level(3).is_err());
    }

    #[test]
    fn test_client_id_derived_from_node_name() {
        let id = client_id(&MqttConfig::default(), "mobile_base/state_publisher");
        assert!(id.starts_with("mobile_base_state_publisher-"));
        assert_eq!(client_id(&config(""), "ignored"), "base-status-test");
    }

    #[tokio::test]
    async fn test_topics_get_base_prefix() {
        let (client, _event_loop) = build_client(&config("robot-1/"), "node");
        let registry = MqttChannelRegistry::new(client, &config("robot-1/")).unwrap();

        let channel = Channel::new(DEFAULT_NAMESPACE, StatusField::Battery);
        assert_eq!(registry.topic_for(&channel), "robot-1/mobile_base/battery");

        let (client, _event_loop) = build_client(&config(""), "node");
        let registry = MqttChannelRegistry::new(client, &config("")).unwrap();
        assert_eq!(registry.topic_for(&channel), "mobile_base/battery");
    }

    #[tokio::test]
    async fn test_wildcard_namespace_is_refused() {
        let (client, _event_loop) = build_client(&config(""), "node");
        let registry = MqttChannelRegistry::new(client, &config("")).unwrap();

        let err = ChannelTable::register(&registry, Channel::declare_all("robots/+")).unwrap_err();
        assert!(matches!(err, TransportError::Registration { .. }));
    }

    #[tokio::test]
    async fn test_publish_queues_request() {
        let (client, _event_loop) = build_client(&config(""), "node");
        let registry = MqttChannelRegistry::new(client, &config("")).unwrap();
        let table =
            ChannelTable::register(&registry, Channel::declare_all(DEFAULT_NAMESPACE)).unwrap();

        for (_, sink) in table.iter() {
            sink.publish(42).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_publish_fails_once_event_loop_is_gone() {
        let (client, event_loop) = build_client(&config(""), "node");
        let registry = MqttChannelRegistry::new(client, &config("")).unwrap();
        let sink = registry
            .create_sink(&Channel::new(DEFAULT_NAMESPACE, StatusField::Bumper))
            .unwrap();

        drop(event_loop);
        let err = sink.publish(1).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Publish { ref channel, .. } if channel == "mobile_base/bumper"
        ));
    }
}
