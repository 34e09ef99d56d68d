//! Base status snapshot and the device-side trait that produces it.

use std::fmt;

use super::error::DeviceResult;

/// One atomic read of the base status. All fields come from the same device
/// read; the publisher never re-reads a single field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StatusSnapshot {
    /// Bumper contact flags.
    pub bumper: u8,
    /// Wheel-drop sensor flags.
    pub wheel_drop: u8,
    /// Cliff sensor flags.
    pub cliff: u8,
    /// Charger / docking state.
    pub charger: u8,
    /// Battery level as reported by the base.
    pub battery: u8,
}

impl StatusSnapshot {
    /// Builds a snapshot with fields in publish order.
    pub fn new(bumper: u8, wheel_drop: u8, cliff: u8, charger: u8, battery: u8) -> Self {
        Self {
            bumper,
            wheel_drop,
            cliff,
            charger,
            battery,
        }
    }
}

/// Names a single field of [`StatusSnapshot`]. The declaration order is the
/// publish order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    Bumper,
    WheelDrop,
    Cliff,
    Charger,
    Battery,
}

impl StatusField {
    /// Every field, in publish order.
    pub const ALL: [StatusField; 5] = [
        StatusField::Bumper,
        StatusField::WheelDrop,
        StatusField::Cliff,
        StatusField::Charger,
        StatusField::Battery,
    ];

    /// Channel name suffix for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusField::Bumper => "bumper",
            StatusField::WheelDrop => "wheel_drop",
            StatusField::Cliff => "cliff",
            StatusField::Charger => "charger",
            StatusField::Battery => "battery",
        }
    }

    /// Reads this field out of a snapshot.
    pub fn extract(&self, snapshot: &StatusSnapshot) -> u8 {
        match self {
            StatusField::Bumper => snapshot.bumper,
            StatusField::WheelDrop => snapshot.wheel_drop,
            StatusField::Cliff => snapshot.cliff,
            StatusField::Charger => snapshot.charger,
            StatusField::Battery => snapshot.battery,
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A base device that can report its current status.
///
/// Once injected, the source is owned exclusively by the publish loop, so
/// `read` takes `&mut self`. Implementations talking to blocking hardware
/// should move the blocking call onto `tokio::task::spawn_blocking`.
#[async_trait::async_trait]
pub trait StatusSource: Send + 'static {
    /// Reads one consistent snapshot of all status fields.
    async fn read(&mut self) -> DeviceResult<StatusSnapshot>;
}

#[async_trait::async_trait]
impl<S: StatusSource + ?Sized> StatusSource for Box<S> {
    async fn read(&mut self) -> DeviceResult<StatusSnapshot> {
        (**self).read().await
    }
}
