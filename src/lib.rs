//! base-status: periodic mobile-base status publisher
//!
//! Polls a base device for its status and republishes each snapshot as five
//! independent one-byte channels (`bumper`, `wheel_drop`, `cliff`, `charger`,
//! `battery`) at a fixed period. Publishing starts only once a device has
//! been handed over, and stops for good on the first failed read or publish.
//!
//! ## Modules
//!
//! * `config`: TOML configuration with `validator` checks.
//! * `core`: status model, channel table, start gate, publish loop and
//!   lifecycle controller.
//! * `device`: simulated base used when no hardware driver is linked.
//! * `logger`: `tracing` subscriber setup (console, optional journald).
//! * `transport`: channel registries, trace-log only or MQTT with the
//!   `mqtt` feature (default).

pub mod config;
pub mod core;
pub mod device;
pub mod logger;
pub mod transport;
