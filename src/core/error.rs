use thiserror::Error;

/// Errors raised by a [`StatusSource`](super::status::StatusSource) while
/// reading a status snapshot from the base.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The underlying link (serial, USB) failed.
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered, but the answer could not be decoded.
    #[error("Device protocol error: {0}")]
    Protocol(String),

    /// The device went away after it was injected.
    #[error("Device disconnected")]
    Disconnected,
}

/// Errors raised by the pub-sub side: sink registration and publishing.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A publish on an already registered channel failed.
    #[error("Failed to publish on '{channel}': {reason}")]
    Publish { channel: String, reason: String },

    /// The transport refused to create a sink for a channel.
    #[error("Failed to register channel '{channel}': {reason}")]
    Registration { channel: String, reason: String },

    /// The transport link is shut down.
    #[error("Transport closed")]
    Closed,
}

/// Errors returned by [`StartGate::wait`](super::gate::StartGate::wait).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The wait was cancelled before any device was released.
    #[error("Interrupted while waiting for the base device")]
    Interrupted,

    /// Another waiter already took the released device.
    #[error("Device has already been claimed by another waiter")]
    AlreadyClaimed,
}

/// A failure inside one poll-and-publish cycle. Carries the cycle number and
/// the phase that failed so the terminal loop state identifies it exactly.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Status read failed on cycle {cycle}: {source}")]
    Read {
        cycle: u64,
        #[source]
        source: DeviceError,
    },

    #[error(
        "Publish on '{channel}' failed on cycle {cycle} after {published} channel(s): {source}"
    )]
    Publish {
        cycle: u64,
        channel: String,
        /// Channels successfully published in this cycle before the failure.
        published: usize,
        #[source]
        source: TransportError,
    },
}

impl CycleError {
    /// Cycle number in which the failure happened (1-based).
    pub fn cycle(&self) -> u64 {
        match self {
            CycleError::Read { cycle, .. } | CycleError::Publish { cycle, .. } => *cycle,
        }
    }

    /// Short name of the failed phase, for logs.
    pub fn phase(&self) -> &'static str {
        match self {
            CycleError::Read { .. } => "read",
            CycleError::Publish { .. } => "publish",
        }
    }
}

/// Errors surfaced to the host by the
/// [`LifecycleController`](super::lifecycle::LifecycleController).
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Publisher has already been started")]
    AlreadyStarted,

    /// `set_device` was called again after the first device was accepted.
    #[error("A base device has already been set; the first device is kept")]
    DeviceAlreadySet,

    /// Sink registration failed during start; the loop was never spawned.
    #[error("Channel registration failed: {0}")]
    Registration(#[source] TransportError),

    #[error("Publish loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_reports_phase_and_cycle() {
        let err = CycleError::Read {
            cycle: 7,
            source: DeviceError::Disconnected,
        };
        assert_eq!(err.cycle(), 7);
        assert_eq!(err.phase(), "read");
        assert_eq!(
            err.to_string(),
            "Status read failed on cycle 7: Device disconnected"
        );

        let err = CycleError::Publish {
            cycle: 3,
            channel: "mobile_base/cliff".into(),
            published: 2,
            source: TransportError::Closed,
        };
        assert_eq!(err.phase(), "publish");
        assert!(err.to_string().contains("after 2 channel(s)"));
    }

    #[test]
    fn test_device_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "serial gone");
        let err: DeviceError = io.into();
        assert!(err.to_string().contains("serial gone"));
    }
}
