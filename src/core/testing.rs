//! Fakes shared by the core unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::time::Instant;

use super::{
    channel::{Channel, ChannelRegistry, ChannelSink},
    error::{DeviceError, DeviceResult, TransportError, TransportResult},
    status::{StatusSnapshot, StatusSource},
};

/// Source that replays a script of read results, then repeats `fallback`.
pub struct ScriptedSource {
    script: VecDeque<DeviceResult<StatusSnapshot>>,
    fallback: StatusSnapshot,
    reads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn repeating(snapshot: StatusSnapshot) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: snapshot,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then(mut self, result: DeviceResult<StatusSnapshot>) -> Self {
        self.script.push_back(result);
        self
    }

    pub fn then_fail(self) -> Self {
        self.then(Err(DeviceError::Disconnected))
    }

    /// Shared read counter; stays valid after the source moves into a loop.
    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

#[async_trait::async_trait]
impl StatusSource for ScriptedSource {
    async fn read(&mut self) -> DeviceResult<StatusSnapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(Ok(self.fallback))
    }
}

/// Source that returns `healthy_reads` default snapshots, then panics the
/// way a buggy driver would.
pub struct PanickingSource {
    pub healthy_reads: usize,
}

#[async_trait::async_trait]
impl StatusSource for PanickingSource {
    async fn read(&mut self) -> DeviceResult<StatusSnapshot> {
        if self.healthy_reads == 0 {
            panic!("driver bug");
        }
        self.healthy_reads -= 1;
        Ok(StatusSnapshot::default())
    }
}

/// One observed publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub channel: String,
    pub value: u8,
    pub at: Instant,
}

/// Shared log of every publish across all sinks, in call order.
pub type PublishLog = Arc<Mutex<Vec<Published>>>;

struct RecordingSink {
    channel: String,
    log: PublishLog,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

#[async_trait::async_trait]
impl ChannelSink for RecordingSink {
    async fn publish(&self, value: u8) -> TransportResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(TransportError::Publish {
                channel: self.channel.clone(),
                reason: "link down".into(),
            });
        }
        self.log.lock().unwrap().push(Published {
            channel: self.channel.clone(),
            value,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Registry handing out recording sinks that share one log.
#[derive(Default)]
pub struct RecordingRegistry {
    pub log: PublishLog,
    /// `(channel suffix, call number)`: that sink fails on that call.
    pub fail: Option<(&'static str, usize)>,
    /// Channel suffix whose registration is refused.
    pub refuse: Option<&'static str>,
}

impl RecordingRegistry {
    pub fn failing(suffix: &'static str, on_call: usize) -> Self {
        Self {
            fail: Some((suffix, on_call)),
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.log.lock().unwrap().clone()
    }

    pub fn values_for(&self, channel: &str) -> Vec<u8> {
        self.published()
            .into_iter()
            .filter(|p| p.channel == channel)
            .map(|p| p.value)
            .collect()
    }
}

impl ChannelRegistry for RecordingRegistry {
    fn create_sink(&self, channel: &Channel) -> TransportResult<Arc<dyn ChannelSink>> {
        let suffix = channel.field().as_str();
        if self.refuse == Some(suffix) {
            return Err(TransportError::Registration {
                channel: channel.name().to_string(),
                reason: "refused".into(),
            });
        }
        let fail_on_call = match self.fail {
            Some((s, call)) if s == suffix => Some(call),
            _ => None,
        };
        Ok(Arc::new(RecordingSink {
            channel: channel.name().to_string(),
            log: self.log.clone(),
            calls: AtomicUsize::new(0),
            fail_on_call,
        }))
    }
}
