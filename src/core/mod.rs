//! Core runtime: status model, channel table, start gate, publish loop and
//! the host-facing lifecycle controller.

pub mod channel;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod publish_loop;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{Channel, ChannelRegistry, ChannelSink, ChannelTable};
pub use error::{CycleError, DeviceError, GateError, LifecycleError, TransportError};
pub use gate::{GateState, StartGate};
pub use lifecycle::LifecycleController;
pub use publish_loop::{LoopHandle, LoopState, PublishLoop, StopReason};
pub use status::{StatusField, StatusSnapshot, StatusSource};
