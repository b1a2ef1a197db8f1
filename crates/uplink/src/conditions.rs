//! Battery and connectivity gate for upload attempts.
//!
//! A missing signal never blocks uploads: hosts without a battery, or a network
//! provider that cannot tell, are treated as permitting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Default battery level below which an unplugged device stops uploading.
pub const DEFAULT_MIN_BATTERY_LEVEL: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    Unknown,
    Unplugged,
    Charging,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub state: BatteryState,
    /// Charge level in `[0, 1]`.
    pub level: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    Yes,
    /// The platform cannot tell; uploads are attempted.
    Maybe,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConnectionInfo {
    pub reachability: Reachability,
}

#[cfg_attr(test, mockall::automock)]
pub trait BatteryStatusProvider: Send + Sync {
    /// Current battery snapshot, `None` if unavailable.
    fn current(&self) -> Option<BatteryStatus>;
}

#[cfg_attr(test, mockall::automock)]
pub trait NetworkInfoProvider: Send + Sync {
    /// Current connectivity snapshot, `None` if unavailable.
    fn current(&self) -> Option<NetworkConnectionInfo>;
}

/// Provider whose value is set by the host, e.g. from platform callbacks.
#[derive(Debug, Default)]
pub struct ManualStatus<T> {
    value: Mutex<Option<T>>,
}

impl<T: Copy> ManualStatus<T> {
    pub fn new(value: Option<T>) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn set(&self, value: Option<T>) {
        *self.value.lock() = value;
    }

    pub fn get(&self) -> Option<T> {
        *self.value.lock()
    }
}

impl BatteryStatusProvider for ManualStatus<BatteryStatus> {
    fn current(&self) -> Option<BatteryStatus> {
        self.get()
    }
}

impl NetworkInfoProvider for ManualStatus<NetworkConnectionInfo> {
    fn current(&self) -> Option<NetworkConnectionInfo> {
        self.get()
    }
}

/// Why an upload cycle was skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Blocker {
    NetworkUnreachable,
    BatteryLow { level: f32 },
}

pub struct DataUploadConditions {
    network: Arc<dyn NetworkInfoProvider>,
    battery: Option<Arc<dyn BatteryStatusProvider>>,
    min_battery_level: f32,
}

impl DataUploadConditions {
    /// `battery` is `None` on hosts without a battery sensor.
    pub fn new(
        network: Arc<dyn NetworkInfoProvider>,
        battery: Option<Arc<dyn BatteryStatusProvider>>,
    ) -> Self {
        Self {
            network,
            battery,
            min_battery_level: DEFAULT_MIN_BATTERY_LEVEL,
        }
    }

    pub fn with_min_battery_level(mut self, level: f32) -> Self {
        self.min_battery_level = level;
        self
    }

    /// Unmet conditions, empty when uploading is allowed.
    pub fn blockers(&self) -> Vec<Blocker> {
        let mut blockers = Vec::new();

        let reachability = self
            .network
            .current()
            .map_or(Reachability::Maybe, |info| info.reachability);
        if reachability == Reachability::No {
            blockers.push(Blocker::NetworkUnreachable);
        }

        if let Some(status) = self.battery.as_ref().and_then(|b| b.current())
            && status.state == BatteryState::Unplugged
            && status.level < self.min_battery_level
        {
            blockers.push(Blocker::BatteryLow {
                level: status.level,
            });
        }

        trace!(?reachability, ?blockers, "Evaluated upload conditions");
        blockers
    }

    pub fn is_met(&self) -> bool {
        self.blockers().is_empty()
    }
}
