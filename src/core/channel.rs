//! Channels and the sinks they publish to.
//!
//! A [`ChannelTable`] is the ordered list of `(channel, sink)` pairs built once
//! at startup through a [`ChannelRegistry`]. The publish loop walks it every
//! cycle; its order is the publish order and it never changes afterwards.

use std::{fmt, sync::Arc};

use tracing::debug;

use super::{
    error::TransportResult,
    status::{StatusField, StatusSnapshot},
};

/// Message type carried by every status channel: one unsigned byte.
pub const BYTE_MESSAGE: &str = "std_msgs/Byte";

/// Default channel namespace.
pub const DEFAULT_NAMESPACE: &str = "mobile_base";

/// A named publish destination for one snapshot field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    field: StatusField,
    message_type: &'static str,
}

impl Channel {
    /// Creates the channel `<namespace>/<field>`, or just `<field>` when
    /// `namespace` is empty. The namespace is used as given; configuration
    /// validation rejects malformed ones.
    pub fn new(namespace: &str, field: StatusField) -> Self {
        let name = if namespace.is_empty() {
            field.as_str().to_string()
        } else {
            format!("{}/{}", namespace, field.as_str())
        };
        Self {
            name,
            field,
            message_type: BYTE_MESSAGE,
        }
    }

    /// The five status channels under `namespace`, in publish order.
    pub fn declare_all(namespace: &str) -> Vec<Channel> {
        StatusField::ALL
            .iter()
            .map(|field| Channel::new(namespace, *field))
            .collect()
    }

    /// Full channel name, e.g. `mobile_base/battery`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> StatusField {
        self.field
    }

    /// Message shape handed to the transport; always [`BYTE_MESSAGE`].
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Value this channel publishes for `snapshot`.
    pub fn extract(&self, snapshot: &StatusSnapshot) -> u8 {
        self.field.extract(snapshot)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.message_type)
    }
}

/// Publish side of a single channel.
#[async_trait::async_trait]
pub trait ChannelSink: Send + Sync {
    /// Publishes one value on this sink's channel.
    async fn publish(&self, value: u8) -> TransportResult<()>;
}

/// Creates sinks for declared channels. Provided by the transport.
pub trait ChannelRegistry: Send + Sync {
    /// Registers `channel` with the transport and returns its sink.
    fn create_sink(&self, channel: &Channel) -> TransportResult<Arc<dyn ChannelSink>>;
}

/// Ordered `(channel, sink)` pairs, fixed for the lifetime of a loop.
#[derive(Clone)]
pub struct ChannelTable {
    entries: Vec<(Channel, Arc<dyn ChannelSink>)>,
}

impl ChannelTable {
    /// Registers every channel with `registry`, in order. Any registration
    /// failure aborts the whole table.
    pub fn register(
        registry: &dyn ChannelRegistry,
        channels: Vec<Channel>,
    ) -> TransportResult<Self> {
        let mut entries = Vec::with_capacity(channels.len());
        for channel in channels {
            let sink = registry.create_sink(&channel)?;
            debug!("Registered channel {}", channel);
            entries.push((channel, sink));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Channel names in publish order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(c, _)| c.name()).collect()
    }

    /// Entries in publish order.
    pub fn iter(&self) -> impl Iterator<Item = &(Channel, Arc<dyn ChannelSink>)> {
        self.entries.iter()
    }
}

impl fmt::Debug for ChannelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTable")
            .field("channels", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::error::TransportError;

    struct NullSink;

    #[async_trait::async_trait]
    impl ChannelSink for NullSink {
        async fn publish(&self, _value: u8) -> TransportResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRegistry {
        registered: Mutex<Vec<(String, &'static str)>>,
        reject: Option<&'static str>,
    }

    impl ChannelRegistry for RecordingRegistry {
        fn create_sink(&self, channel: &Channel) -> TransportResult<Arc<dyn ChannelSink>> {
            if self.reject == Some(channel.field().as_str()) {
                return Err(TransportError::Registration {
                    channel: channel.name().to_string(),
                    reason: "rejected".into(),
                });
            }
            self.registered
                .lock()
                .unwrap()
                .push((channel.name().to_string(), channel.message_type()));
            Ok(Arc::new(NullSink))
        }
    }

    #[test]
    fn test_declare_all_uses_namespace_and_order() {
        let names: Vec<_> = Channel::declare_all("mobile_base")
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "mobile_base/bumper",
                "mobile_base/wheel_drop",
                "mobile_base/cliff",
                "mobile_base/charger",
                "mobile_base/battery",
            ]
        );
    }

    #[test]
    fn test_channel_name_without_namespace() {
        assert_eq!(Channel::new("", StatusField::Cliff).name(), "cliff");
        assert_eq!(
            Channel::new("robots/r1", StatusField::Cliff).name(),
            "robots/r1/cliff"
        );
    }

    #[test]
    fn test_register_builds_table_in_order() {
        let registry = RecordingRegistry::default();
        let table =
            ChannelTable::register(&registry, Channel::declare_all(DEFAULT_NAMESPACE)).unwrap();

        assert_eq!(table.len(), 5);
        let registered = registry.registered.lock().unwrap();
        assert_eq!(registered[0], ("mobile_base/bumper".into(), BYTE_MESSAGE));
        assert_eq!(registered[4], ("mobile_base/battery".into(), BYTE_MESSAGE));
        assert_eq!(table.names()[2], "mobile_base/cliff");
    }

    #[test]
    fn test_register_fails_on_first_rejected_channel() {
        let registry = RecordingRegistry {
            reject: Some("cliff"),
            ..Default::default()
        };
        let err = ChannelTable::register(&registry, Channel::declare_all(DEFAULT_NAMESPACE))
            .unwrap_err();

        assert!(err.to_string().contains("mobile_base/cliff"));
        assert_eq!(registry.registered.lock().unwrap().len(), 2);
    }
}
