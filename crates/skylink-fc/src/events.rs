use serde::Serialize;
use skylink_wire::dialect::MISSION_ITEM_DATA;
use skylink_wire::MessageKind;
use tokio::sync::{broadcast, mpsc};

use crate::params::ParameterTable;
use crate::tracker::Location;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LinkEvent {
    VehicleFound,
    VehicleLost,
    StatusChanged(String),
    SysStatusChanged {
        battery_level: Option<f32>,
        battery_voltage: Option<f32>,
    },
    LocationChanged(Location),
    ModeChanged(String),
    WaypointsDownloaded(Vec<MISSION_ITEM_DATA>),
    ParametersDownloaded(ParameterTable),
    GuidedAck { result: u8 },
    /// An exchange ran out of retries; its state machine has stopped.
    ExchangeFailed { expected: MessageKind, attempts: u32 },
    /// A download was stopped because a guided target took over the
    /// exchange it was waiting on.
    DownloadInterrupted { expected: MessageKind },
}

pub trait EventSink {
    fn publish(&mut self, event: LinkEvent);
}

impl EventSink for Vec<LinkEvent> {
    fn publish(&mut self, event: LinkEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<LinkEvent> {
    fn publish(&mut self, event: LinkEvent) {
        // Nobody listening is fine.
        let _ = self.send(event);
    }
}

impl EventSink for broadcast::Sender<LinkEvent> {
    fn publish(&mut self, event: LinkEvent) {
        let _ = self.send(event);
    }
}
