pub mod autodetect;
pub mod error;
pub mod events;
pub mod exchange;
pub mod link;
pub mod liveness;
pub mod mode;
pub mod outbound;
pub mod params;
pub mod runtime;
pub mod throttle;
pub mod timer;
pub mod tracker;
pub mod waypoints;

#[cfg(test)]
mod testing;

use std::time::Duration;

use serde::Deserialize;

pub use error::{FcError, Result};
pub use events::{EventSink, LinkEvent};
pub use exchange::RetryPolicy;
pub use link::{LinkSettings, LinkStats, VehicleLink};
pub use params::{CompletionPolicy, Param, ParameterTable};
pub use runtime::{spawn_link, LinkHandle, LinkSnapshot, RuntimeOptions, SpawnedLink};
pub use tracker::{Location, VehicleState};

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// If true, probe candidate serial ports/bauds and pick the first
    /// that yields a HEARTBEAT from `target_sys`.
    pub autodetect: bool,

    /// When autodetect=false: fixed port config
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    /// Autodetect candidates (paths). Example:
    /// ["/dev/serial0","/dev/ttyAMA0","/dev/ttyS0","/dev/ttyUSB0","/dev/ttyACM0"]
    pub candidate_devs: Option<Vec<String>>,

    /// Autodetect candidate baud rates (common ArduPilot telemetry values).
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we use (ground side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (vehicle side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Require seeing a vehicle heartbeat before sending commands
    pub require_heartbeat: bool,

    /// Optional: companion heartbeat rate. Default 1 Hz, 0 disables.
    pub send_heartbeat_hz: Option<f32>,

    /// Sends per reliable exchange before giving up. Default 5.
    pub retry_attempts: Option<u32>,
    pub retry_interval_ms: Option<u64>,

    /// Minimum spacing between published location updates.
    pub position_window_ms: Option<u64>,

    /// Heartbeat silence after which the vehicle counts as lost.
    pub liveness_timeout_ms: Option<u64>,

    #[serde(default)]
    pub param_completion: CompletionPolicy,
}

impl FcConfig {
    pub fn link_settings(&self) -> LinkSettings {
        let base = LinkSettings::default();
        LinkSettings {
            sys_id: self.sys_id,
            comp_id: self.comp_id,
            target_sys: self.target_sys,
            target_comp: self.target_comp,
            retry: RetryPolicy {
                attempts: self.retry_attempts.unwrap_or(base.retry.attempts).max(1),
                interval: self.retry_interval_ms.map(Duration::from_millis).unwrap_or(base.retry.interval),
            },
            position_window: self.position_window_ms.map(Duration::from_millis).unwrap_or(base.position_window),
            liveness_timeout: self.liveness_timeout_ms.map(Duration::from_millis).unwrap_or(base.liveness_timeout),
            param_completion: self.param_completion,
            require_heartbeat: self.require_heartbeat,
        }
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        let hz = self.send_heartbeat_hz.unwrap_or(1.0);
        let heartbeat_interval = if hz > 0.0 { Some(Duration::from_secs_f32(1.0 / hz)) } else { None };
        RuntimeOptions { heartbeat_interval, ..RuntimeOptions::default() }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(1500))
    }
}
