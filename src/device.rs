//! Simulated mobile base.
//!
//! Stands in for a hardware driver when none is linked. The battery drains by
//! one unit every `drain_every` reads. At zero the base "docks": `charger`
//! goes to 1 and the battery climbs back to its initial level, then the base
//! undocks and the cycle repeats. Bumper, wheel-drop and cliff stay clear.

use tracing::debug;

use crate::{
    config::device::DeviceConfig,
    core::{
        error::{DeviceError, DeviceResult},
        status::{StatusSnapshot, StatusSource},
    },
};

/// Charger value while docked.
pub const CHARGER_DOCKED: u8 = 1;

#[derive(Debug, Clone)]
pub struct SimulatedBase {
    full: u8,
    battery: u8,
    docked: bool,
    drain_every: u64,
    fail_after: Option<u64>,
    reads: u64,
}

impl SimulatedBase {
    /// Creates a docked-off base at `config.initial_battery`.
    ///
    /// # Arguments
    ///
    /// * `config` - Battery level, drain rate and optional failure point
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            full: config.initial_battery,
            battery: config.initial_battery,
            docked: false,
            drain_every: u64::from(config.drain_every.max(1)),
            fail_after: config.fail_after,
            reads: 0,
        }
    }

    /// Successful reads so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn step(&mut self) {
        if self.reads % self.drain_every != 0 {
            return;
        }
        if self.docked {
            self.battery = self.battery.saturating_add(1).min(self.full);
            if self.battery == self.full {
                debug!("Simulated base charged, undocking");
                self.docked = false;
            }
        } else {
            self.battery = self.battery.saturating_sub(1);
            if self.battery == 0 {
                debug!("Simulated base empty, docking");
                self.docked = true;
            }
        }
    }
}

#[async_trait::async_trait]
impl StatusSource for SimulatedBase {
    async fn read(&mut self) -> DeviceResult<StatusSnapshot> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(DeviceError::Disconnected);
        }

        let snapshot = StatusSnapshot {
            charger: if self.docked { CHARGER_DOCKED } else { 0 },
            battery: self.battery,
            ..Default::default()
        };
        self.reads += 1;
        self.step();
        Ok(snapshot)
    }
}
