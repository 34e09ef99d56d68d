//! Host-facing lifecycle of the status publisher.
//!
//! The host drives three hooks and one injection point:
//!
//! * [`on_start`](LifecycleController::on_start) registers the channel sinks
//!   and spawns the publish loop, which parks on the start gate.
//! * [`set_device`](LifecycleController::set_device) hands the base device
//!   over and opens the gate. It may be called from any thread, before or
//!   after `on_start`. The first device wins.
//! * [`on_shutdown`](LifecycleController::on_shutdown) cancels the loop;
//!   [`on_shutdown_complete`](LifecycleController::on_shutdown_complete)
//!   joins it and reports why it stopped.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock, PoisonError,
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::{
    channel::{Channel, ChannelRegistry, ChannelTable},
    error::LifecycleError,
    gate::{GateState, StartGate},
    publish_loop::{LoopHandle, LoopState, PublishLoop, StopReason},
    status::StatusSource,
};
use crate::config::publisher::PublisherConfig;

/// Bridges host lifecycle events to the start gate and the publish loop.
pub struct LifecycleController<S: StatusSource> {
    node_name: String,
    channels: Vec<Channel>,
    period: Duration,
    registry: Arc<dyn ChannelRegistry>,
    gate: Arc<StartGate<S>>,
    cancel: CancellationToken,
    started: AtomicBool,
    handle: OnceLock<LoopHandle>,
    task: Mutex<Option<JoinHandle<StopReason>>>,
}

impl<S: StatusSource> LifecycleController<S> {
    /// Creates a controller publishing the five status channels declared by
    /// `config` through sinks from `registry`. Nothing is registered or
    /// spawned until [`on_start`](Self::on_start).
    ///
    /// # Arguments
    ///
    /// * `registry` - Transport that creates one sink per channel
    /// * `config` - Node name, channel namespace and period
    pub fn new(registry: Arc<dyn ChannelRegistry>, config: &PublisherConfig) -> Self {
        Self {
            node_name: config.node_name.clone(),
            channels: Channel::declare_all(&config.namespace),
            period: config.period(),
            registry,
            gate: Arc::new(StartGate::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            handle: OnceLock::new(),
            task: Mutex::new(None),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Registers channel sinks and spawns the publish loop.
    ///
    /// The loop waits for [`set_device`](Self::set_device) before reading
    /// anything. Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` on a second call. `Registration` if the transport
    /// refuses a channel; nothing is spawned and `on_start` may be retried.
    pub fn on_start(&self) -> Result<LoopHandle, LifecycleError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyStarted);
        }
        info!("Starting {}", self.node_name);

        let table = match ChannelTable::register(self.registry.as_ref(), self.channels.clone()) {
            Ok(table) => table,
            Err(e) => {
                error!("Failed to register status channels: {}", e);
                self.started.store(false, Ordering::Release);
                return Err(LifecycleError::Registration(e));
            }
        };
        info!("Registered channels: {}", table.names().join(", "));

        let publish_loop = PublishLoop::new(table, self.period);
        let handle = publish_loop.handle();

        let span = info_span!("publish_loop", node = %self.node_name);
        let task = tokio::spawn(
            publish_loop
                .run(self.gate.clone(), self.cancel.clone())
                .instrument(span),
        );

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        // `started` guarantees a single writer.
        let _ = self.handle.set(handle.clone());
        Ok(handle)
    }

    /// Supplies the base device and opens the start gate.
    ///
    /// # Errors
    ///
    /// `DeviceAlreadySet` if a device was supplied before; the first device
    /// stays in use and `device` is dropped.
    pub fn set_device(&self, device: S) -> Result<(), LifecycleError> {
        if self.gate.release(device) {
            info!("Base device set for {}", self.node_name);
            Ok(())
        } else {
            warn!("Base device already set for {}, ignoring", self.node_name);
            Err(LifecycleError::DeviceAlreadySet)
        }
    }

    /// Requests the publish loop to stop. Returns without waiting.
    pub fn on_shutdown(&self) {
        info!("Shutting down {}", self.node_name);
        self.cancel.cancel();
    }

    /// Waits for the publish loop task to finish.
    ///
    /// Returns `None` if the loop was never started or was already joined.
    /// A loop that panicked is stopped with `StopReason::Aborted` and its
    /// join fails with `LifecycleError::Join`.
    /// Does not cancel by itself; call [`on_shutdown`](Self::on_shutdown)
    /// first unless the loop is known to have stopped.
    pub async fn on_shutdown_complete(&self) -> Result<Option<StopReason>, LifecycleError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return Ok(None);
        };

        let reason = task.await?;
        info!("{} shut down: {}", self.node_name, reason);
        Ok(Some(reason))
    }

    /// Current loop state; `NotStarted` until `on_start` succeeds.
    pub fn state(&self) -> LoopState {
        self.handle
            .get()
            .map(LoopHandle::state)
            .unwrap_or(LoopState::NotStarted)
    }

    /// Handle of the spawned loop; `None` before a successful `on_start`.
    pub fn handle(&self) -> Option<LoopHandle> {
        self.handle.get().cloned()
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Token cancelled by [`on_shutdown`](Self::on_shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
