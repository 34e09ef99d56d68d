//! Poll-and-publish loop.
//!
//! The loop waits on the [`StartGate`] for a device, then repeatedly reads a
//! snapshot and publishes each field on its channel, in table order, once per
//! period. The first read or publish error stops it for good (fail-stop):
//! the error is logged once and kept in the terminal [`LoopState`].

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::{
    sync::watch,
    time::{sleep, Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    channel::ChannelTable,
    error::CycleError,
    gate::StartGate,
    status::StatusSource,
};

/// Target period between cycle starts.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Why the loop stopped.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// Shutdown was requested while running.
    Cancelled,
    /// Shutdown was requested before any device arrived.
    Interrupted,
    /// A cycle failed.
    Failed(Arc<CycleError>),
    /// The loop was torn down without finishing: a source or sink panicked,
    /// or its task was aborted.
    Aborted,
}

impl StopReason {
    /// The cycle error behind a `Failed` stop.
    pub fn error(&self) -> Option<&CycleError> {
        match self {
            StopReason::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// `true` when publishing ended for any reason other than a shutdown
    /// request.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_) | StopReason::Aborted)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "Cancelled"),
            StopReason::Interrupted => write!(f, "Interrupted before device injection"),
            StopReason::Failed(e) => write!(f, "Failed: {}", e),
            StopReason::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Lifecycle state of a [`PublishLoop`].
#[derive(Debug, Clone)]
pub enum LoopState {
    NotStarted,
    WaitingForDevice,
    Running,
    /// Terminal.
    Stopped(StopReason),
}

impl LoopState {
    pub fn is_running(&self) -> bool {
        matches!(self, LoopState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, LoopState::Stopped(_))
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            LoopState::Stopped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LoopState::NotStarted => "NotStarted",
            LoopState::WaitingForDevice => "WaitingForDevice",
            LoopState::Running => "Running",
            LoopState::Stopped(_) => "Stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Stopped(reason) => write!(f, "Stopped: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Cloneable read-only view of a running loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    state_rx: watch::Receiver<LoopState>,
    cycles: Arc<AtomicU64>,
}

impl LoopHandle {
    /// Snapshot of the current loop state.
    pub fn state(&self) -> LoopState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that sees every state transition, ending with `Stopped`.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }

    /// Number of cycles that published on every channel.
    pub fn completed_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Waits until the loop reaches `Stopped` and returns the reason.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.state_rx.clone();
        loop {
            if let LoopState::Stopped(reason) = &*rx.borrow_and_update() {
                return reason.clone();
            }
            if rx.changed().await.is_err() {
                return StopReason::Aborted;
            }
        }
    }
}

/// Publishes status snapshots on a fixed channel table at a fixed period.
pub struct PublishLoop {
    table: ChannelTable,
    period: Duration,
    state_tx: watch::Sender<LoopState>,
    cycles: Arc<AtomicU64>,
}

impl PublishLoop {
    /// Creates a loop over `table` in the `NotStarted` state.
    ///
    /// # Arguments
    ///
    /// * `table` - Channels to publish on, in publish order
    /// * `period` - Target time between the starts of two cycles
    pub fn new(table: ChannelTable, period: Duration) -> Self {
        let (state_tx, _) = watch::channel(LoopState::NotStarted);
        Self {
            table,
            period,
            state_tx,
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a read-only view that outlives the loop itself.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            state_rx: self.state_tx.subscribe(),
            cycles: self.cycles.clone(),
        }
    }

    /// Target period between cycle starts.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the device on `gate`, then runs until cancelled or until
    /// the first failed cycle. No device state is touched before the gate
    /// opens.
    pub async fn run<S: StatusSource>(
        self,
        gate: Arc<StartGate<S>>,
        cancel: CancellationToken,
    ) -> StopReason {
        self.set_state(LoopState::WaitingForDevice);

        let source = match gate.wait(&cancel).await {
            Ok(source) => source,
            Err(e) => {
                info!("{}, publish loop not started", e);
                return self.stop(StopReason::Interrupted);
            }
        };

        info!("Base device received");
        self.run_with(source, cancel).await
    }

    /// Runs the poll-and-publish cycle with an already available source.
    pub async fn run_with<S: StatusSource>(
        self,
        mut source: S,
        cancel: CancellationToken,
    ) -> StopReason {
        info!(
            "Status publishing started ({} channels, period: {:?})",
            self.table.len(),
            self.period
        );
        self.set_state(LoopState::Running);

        let mut cycle: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled);
            }

            let start = Instant::now();
            cycle += 1;

            if let Err(e) = self.cycle(&mut source, cycle).await {
                error!(
                    cycle = e.cycle(),
                    phase = e.phase(),
                    "Error in status publisher loop, stopping: {}",
                    e
                );
                return self.stop(StopReason::Failed(Arc::new(e)));
            }
            self.cycles.fetch_add(1, Ordering::AcqRel);
            trace!("Cycle {} published", cycle);

            let elapsed = start.elapsed();
            if elapsed < self.period {
                tokio::select! {
                    _ = cancel.cancelled() => return self.stop(StopReason::Cancelled),
                    _ = sleep(self.period - elapsed) => {}
                }
            } else {
                debug!(
                    "Cycle {} overran period: {:?} > {:?}",
                    cycle, elapsed, self.period
                );
            }
        }
    }

    /// One read followed by one publish per channel, in table order.
    async fn cycle<S: StatusSource>(&self, source: &mut S, cycle: u64) -> Result<(), CycleError> {
        let snapshot = source
            .read()
            .await
            .map_err(|source| CycleError::Read { cycle, source })?;

        for (published, (channel, sink)) in self.table.iter().enumerate() {
            sink.publish(channel.extract(&snapshot))
                .await
                .map_err(|source| CycleError::Publish {
                    cycle,
                    channel: channel.name().to_string(),
                    published,
                    source,
                })?;
        }
        Ok(())
    }

    fn set_state(&self, state: LoopState) {
        let old = self.state_tx.send_replace(state);
        debug!(
            "Publish loop state: {} -> {}",
            old,
            *self.state_tx.borrow()
        );
    }

    fn stop(&self, reason: StopReason) -> StopReason {
        match &reason {
            StopReason::Cancelled => info!(
                "Status publishing stopped after {} cycles",
                self.cycles.load(Ordering::Acquire)
            ),
            StopReason::Interrupted => warn!("Status publishing never started"),
            StopReason::Failed(_) | StopReason::Aborted => warn!(
                "Status publishing halted; subscribers will receive no further updates"
            ),
        }
        self.set_state(LoopState::Stopped(reason.clone()));
        reason
    }
}

/// A loop dropped while waiting or running was unwound or aborted; its state
/// still has to become terminal.
impl Drop for PublishLoop {
    fn drop(&mut self) {
        let aborted = self.state_tx.send_if_modified(|state| {
            if matches!(state, LoopState::WaitingForDevice | LoopState::Running) {
                *state = LoopState::Stopped(StopReason::Aborted);
                true
            } else {
                false
            }
        });
        if aborted {
            error!(
                "Status publisher loop aborted after {} cycles; subscribers will receive no further updates",
                self.cycles.load(Ordering::Acquire)
            );
        }
    }
}
