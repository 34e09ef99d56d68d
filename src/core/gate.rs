//! One-shot start gate for the publish loop.
//!
//! The gate holds the loop back until a base device is supplied. The device
//! itself travels through the gate: `release` moves it into a oneshot channel
//! and `wait` hands it to the single waiter, so the loop owns the device
//! outright and no lock is needed around reads.
//!
//! `release` may run before `wait`; the value stays in the channel and the
//! later `wait` returns at once. Only the first `release` is accepted.

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::GateError;

/// Observable state of a [`StartGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No device has been supplied yet.
    Waiting,
    /// A device has been supplied. Terminal.
    Released,
}

impl GateState {
    pub fn is_released(&self) -> bool {
        matches!(self, GateState::Released)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Waiting => write!(f, "Waiting"),
            GateState::Released => write!(f, "Released"),
        }
    }
}

/// Single-assignment gate carrying a device of type `D` to one waiter.
pub struct StartGate<D> {
    state_tx: watch::Sender<GateState>,
    sender: Mutex<Option<oneshot::Sender<D>>>,
    receiver: Mutex<Option<oneshot::Receiver<D>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: Send> StartGate<D> {
    /// Creates a closed gate in the `Waiting` state.
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        let (state_tx, _) = watch::channel(GateState::Waiting);
        Self {
            state_tx,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
        }
    }

    /// Supplies the device and opens the gate.
    ///
    /// Returns `true` if this call opened the gate. Every later call returns
    /// `false` and drops its device: the first device wins.
    pub fn release(&self, device: D) -> bool {
        let Some(tx) = lock(&self.sender).take() else {
            warn!("Start gate already released, ignoring device");
            return false;
        };

        // Released must be observable before the waiter can start reading.
        self.state_tx.send_replace(GateState::Released);
        // The waiter may have been interrupted and gone; the gate still opens.
        if tx.send(device).is_err() {
            debug!("Start gate released with no waiter left");
        }
        debug!("Start gate released");
        true
    }

    /// Waits until a device is released and takes it.
    ///
    /// Blocks without timeout. Returns immediately if the gate is already
    /// open. Cancelling `cancel` before a device arrives yields
    /// [`GateError::Interrupted`]. Only one caller can ever take the device.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<D, GateError> {
        let rx = lock(&self.receiver)
            .take()
            .ok_or(GateError::AlreadyClaimed)?;

        if !self.is_released() {
            info!("Waiting for base device...");
        }

        tokio::select! {
            biased;
            device = rx => device.map_err(|_| GateError::Interrupted),
            _ = cancel.cancelled() => Err(GateError::Interrupted),
        }
    }

    /// Current gate state.
    pub fn state(&self) -> GateState {
        *self.state_tx.borrow()
    }

    pub fn is_released(&self) -> bool {
        self.state().is_released()
    }

    /// Subscribes to gate state changes.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state_tx.subscribe()
    }
}

impl<D: Send> Default for StartGate<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for StartGate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartGate")
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}
