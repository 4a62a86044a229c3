use std::time::{Duration, Instant};

use serde::Serialize;
use skylink_wire::dialect::{GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, STATUSTEXT_DATA, SYS_STATUS_DATA};
use skylink_wire::field_text;
use tracing::{debug, info};

use crate::events::LinkEvent;
use crate::mode::{mode_name, UNKNOWN_MODE};
use crate::throttle::LatestWindow;

pub const DEFAULT_POSITION_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// Metres above MSL.
    pub alt_m: f32,
    pub relative_alt_m: f32,
    pub heading_deg: Option<f32>,
}

impl From<&GLOBAL_POSITION_INT_DATA> for Location {
    fn from(p: &GLOBAL_POSITION_INT_DATA) -> Self {
        Self {
            lat: p.lat as f64 / 1e7,
            lon: p.lon as f64 / 1e7,
            alt_m: p.alt as f32 / 1000.0,
            relative_alt_m: p.relative_alt as f32 / 1000.0,
            heading_deg: (p.hdg != u16::MAX).then(|| p.hdg as f32 / 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    pub status: Option<String>,
    pub location: Option<Location>,
    /// Remaining charge as a fraction, 1.0 = full.
    pub battery_level: Option<f32>,
    /// Volts.
    pub battery_voltage: Option<f32>,
    pub mode: String,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            status: None,
            location: None,
            battery_level: None,
            battery_voltage: None,
            mode: UNKNOWN_MODE.to_string(),
        }
    }
}

/// Folds telemetry into [`VehicleState`]. Independent of any exchange.
#[derive(Debug)]
pub struct StateTracker {
    state: VehicleState,
    position: LatestWindow<Location>,
}

impl StateTracker {
    pub fn new(position_window: Duration) -> Self {
        Self { state: VehicleState::default(), position: LatestWindow::new(position_window) }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn on_status_text(&mut self, st: &STATUSTEXT_DATA) -> LinkEvent {
        let text = field_text(&st.text);
        info!(severity = ?st.severity, "vehicle: {}", text);
        self.state.status = Some(text.clone());
        LinkEvent::StatusChanged(text)
    }

    pub fn on_sys_status(&mut self, s: &SYS_STATUS_DATA) -> LinkEvent {
        self.state.battery_level =
            (0..=100).contains(&s.battery_remaining).then(|| s.battery_remaining as f32 / 100.0);
        self.state.battery_voltage =
            (s.voltage_battery != u16::MAX).then(|| s.voltage_battery as f32 / 1000.0);
        LinkEvent::SysStatusChanged {
            battery_level: self.state.battery_level,
            battery_voltage: self.state.battery_voltage,
        }
    }

    /// Updates the stored location at once; publication is rate limited.
    pub fn on_position(&mut self, p: &GLOBAL_POSITION_INT_DATA, now: Instant) -> Option<LinkEvent> {
        let loc = Location::from(p);
        self.state.location = Some(loc);
        let flushed = self.position.poll(now);
        self.position.offer(loc, now);
        flushed.map(LinkEvent::LocationChanged)
    }

    pub fn on_heartbeat(&mut self, hb: &HEARTBEAT_DATA) -> Option<LinkEvent> {
        let mode = mode_name(hb.custom_mode);
        if self.state.mode == mode {
            return None;
        }
        debug!("mode {} -> {}", self.state.mode, mode);
        self.state.mode = mode.to_string();
        Some(LinkEvent::ModeChanged(self.state.mode.clone()))
    }

    pub fn tick(&mut self, now: Instant) -> Option<LinkEvent> {
        self.position.poll(now).map(LinkEvent::LocationChanged)
    }
}
