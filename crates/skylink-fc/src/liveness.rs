use std::time::{Duration, Instant};

use tracing::{info, warn};

pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Found,
    Lost,
}

/// Heartbeat based presence detection for one vehicle.
#[derive(Debug)]
pub struct LivenessMonitor {
    timeout: Duration,
    last_heartbeat: Option<Instant>,
    present: bool,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, last_heartbeat: None, present: false }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn hb_age(&self, now: Instant) -> Option<Duration> {
        self.last_heartbeat.map(|t| now.duration_since(t))
    }

    pub fn on_heartbeat(&mut self, now: Instant) -> Option<Presence> {
        self.last_heartbeat = Some(now);
        if self.present {
            return None;
        }
        self.present = true;
        info!("vehicle found");
        Some(Presence::Found)
    }

    pub fn poll(&mut self, now: Instant) -> Option<Presence> {
        let age = self.hb_age(now)?;
        if !self.present || age < self.timeout {
            return None;
        }
        self.present = false;
        warn!("vehicle lost: no heartbeat for {:?}", age);
        Some(Presence::Lost)
    }
}
