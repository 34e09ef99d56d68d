//! Channel registries backed by concrete transports.
//!
//! * [`log`]: sinks that only emit trace events; used when the binary is
//!   built without a network transport.
//! * `mqtt`: one MQTT topic per channel (feature `mqtt`).

pub mod log;

#[cfg(feature = "mqtt")]
pub mod connection;
#[cfg(feature = "mqtt")]
pub mod mqtt;
