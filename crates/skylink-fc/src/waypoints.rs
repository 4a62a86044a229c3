use skylink_wire::dialect::{
    MavMissionResult, MISSION_ACK_DATA, MISSION_ITEM_DATA, MISSION_REQUEST_DATA, MISSION_REQUEST_LIST_DATA,
};
use skylink_wire::{Message, MessageKind};
use tracing::{debug, info};

use crate::error::{FcError, Result};
use crate::exchange::ReliableExchange;
use crate::outbound::FrameSink;
use crate::timer::RetryTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointState {
    Idle,
    AwaitingCount,
    AwaitingItem(u16),
    Complete,
    Failed,
}

/// Mission items gathered so far. `items.len() == next_index` always holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointSet {
    pub expected_count: u16,
    pub next_index: u16,
    pub items: Vec<MISSION_ITEM_DATA>,
}

/// Sequential mission download: ask for the count, then fetch each item by
/// index, one request in flight at a time.
#[derive(Debug)]
pub struct WaypointDownload {
    state: WaypointState,
    set: WaypointSet,
    target_system: u8,
    target_component: u8,
}

impl WaypointDownload {
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            state: WaypointState::Idle,
            set: WaypointSet::default(),
            target_system,
            target_component,
        }
    }

    pub fn state(&self) -> WaypointState {
        self.state
    }

    pub fn set(&self) -> &WaypointSet {
        &self.set
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, WaypointState::AwaitingCount | WaypointState::AwaitingItem(_))
    }

    pub fn start<S: FrameSink, T: RetryTimer>(&mut self, ex: &mut ReliableExchange<S, T>) {
        info!("waypoints: requesting mission list");
        self.set = WaypointSet::default();
        self.state = WaypointState::AwaitingCount;
        let req = MISSION_REQUEST_LIST_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
        };
        ex.send_with_retry(Message::MissionRequestList(req), MessageKind::MissionCount);
    }

    /// Feed a MISSION_COUNT or MISSION_ITEM. Returns the finished set once
    /// the last item has been accepted.
    pub fn handle<S: FrameSink, T: RetryTimer>(
        &mut self,
        msg: &Message,
        ex: &mut ReliableExchange<S, T>,
    ) -> Result<Option<Vec<MISSION_ITEM_DATA>>> {
        match msg {
            Message::MissionCount(c) => {
                if self.state != WaypointState::AwaitingCount || ex.offer(msg).is_none() {
                    debug!("waypoints: ignoring unsolicited count {}", c.count);
                    return Ok(None);
                }
                info!("waypoints: vehicle reports {} items", c.count);
                self.set = WaypointSet { expected_count: c.count, next_index: 0, items: Vec::with_capacity(c.count as usize) };
                if c.count == 0 {
                    return Ok(Some(self.finish(ex)));
                }
                self.request(0, ex);
                Ok(None)
            }
            Message::MissionItem(item) => {
                let WaypointState::AwaitingItem(expected) = self.state else {
                    debug!("waypoints: ignoring unsolicited item {}", item.seq);
                    return Ok(None);
                };
                if item.seq != expected {
                    return Err(FcError::SequenceViolation { expected, got: item.seq });
                }
                if ex.offer(msg).is_none() {
                    debug!("waypoints: item {} arrived for a superseded request", item.seq);
                    return Ok(None);
                }

                self.set.items.push(item.clone());
                self.set.next_index += 1;
                if self.set.next_index < self.set.expected_count {
                    self.request(self.set.next_index, ex);
                    return Ok(None);
                }
                Ok(Some(self.finish(ex)))
            }
            _ => Ok(None),
        }
    }

    /// The owning exchange ran out of retries.
    pub fn fail(&mut self) {
        if self.is_active() {
            self.state = WaypointState::Failed;
        }
    }

    fn request<S: FrameSink, T: RetryTimer>(&mut self, seq: u16, ex: &mut ReliableExchange<S, T>) {
        self.state = WaypointState::AwaitingItem(seq);
        let req = MISSION_REQUEST_DATA {
            seq,
            target_system: self.target_system,
            target_component: self.target_component,
        };
        ex.send_with_retry(Message::MissionRequest(req), MessageKind::MissionItem);
    }

    fn finish<S: FrameSink, T: RetryTimer>(&mut self, ex: &mut ReliableExchange<S, T>) -> Vec<MISSION_ITEM_DATA> {
        self.state = WaypointState::Complete;
        ex.send(&Message::MissionAck(MISSION_ACK_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
        }));
        info!("waypoints: download complete ({} items)", self.set.items.len());
        self.set.items.clone()
    }
}
