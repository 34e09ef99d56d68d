use std::sync::Arc;

use tracing::trace;

use crate::core::{
    channel::{Channel, ChannelRegistry, ChannelSink},
    error::TransportResult,
};

/// Registry whose sinks write each value to the trace log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRegistry;

struct LogSink {
    channel: String,
}

#[async_trait::async_trait]
impl ChannelSink for LogSink {
    async fn publish(&self, value: u8) -> TransportResult<()> {
        trace!(channel = %self.channel, value, "status");
        Ok(())
    }
}

impl ChannelRegistry for LogRegistry {
    fn create_sink(&self, channel: &Channel) -> TransportResult<Arc<dyn ChannelSink>> {
        Ok(Arc::new(LogSink {
            channel: channel.name().to_string(),
        }))
    }
}
