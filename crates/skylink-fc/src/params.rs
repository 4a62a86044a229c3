use serde::{Deserialize, Serialize};
use skylink_wire::dialect::{PARAM_REQUEST_LIST_DATA, PARAM_VALUE_DATA};
use skylink_wire::{field_text, Message, MessageKind};
use tracing::{debug, info};

use crate::exchange::ReliableExchange;
use crate::outbound::FrameSink;
use crate::timer::RetryTimer;

/// When a parameter download counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// As soon as the reply for index `total - 1` arrives, filled or not.
    /// Matches what deployed ground stations do.
    #[default]
    LastIndex,
    /// Only once every slot holds a value.
    AllSlots,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub value: f32,
    pub param_type: u8,
}

/// Sparse table indexed by the vehicle's parameter index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterTable {
    slots: Vec<Option<Param>>,
}

impl ParameterTable {
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<&Param> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn find(&self, name: &str) -> Option<&Param> {
        self.present().map(|(_, p)| p).find(|p| p.name == name)
    }

    pub fn present(&self) -> impl Iterator<Item = (usize, &Param)> {
        self.slots.iter().enumerate().filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn resize(&mut self, total: usize) {
        self.slots = vec![None; total];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamState {
    Idle,
    AwaitingFirst,
    AwaitingRest,
    Complete,
    Failed,
}

/// Bulk parameter download. Only the list request is retried; once the
/// first value lands, the vehicle streams the rest unprompted.
#[derive(Debug)]
pub struct ParameterDownload {
    state: ParamState,
    table: ParameterTable,
    policy: CompletionPolicy,
    target_system: u8,
    target_component: u8,
}

impl ParameterDownload {
    pub fn new(target_system: u8, target_component: u8, policy: CompletionPolicy) -> Self {
        Self {
            state: ParamState::Idle,
            table: ParameterTable::default(),
            policy,
            target_system,
            target_component,
        }
    }

    pub fn state(&self) -> ParamState {
        self.state
    }

    pub fn table(&self) -> &ParameterTable {
        &self.table
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ParamState::AwaitingFirst | ParamState::AwaitingRest)
    }

    pub fn start<S: FrameSink, T: RetryTimer>(&mut self, ex: &mut ReliableExchange<S, T>) {
        info!("params: requesting parameter list");
        self.table = ParameterTable::default();
        self.state = ParamState::AwaitingFirst;
        let req = PARAM_REQUEST_LIST_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
        };
        ex.send_with_retry(Message::ParamRequestList(req), MessageKind::ParamValue);
    }

    /// Feed one PARAM_VALUE. Returns the table when the download completes.
    pub fn handle<S: FrameSink, T: RetryTimer>(
        &mut self,
        msg: &Message,
        ex: &mut ReliableExchange<S, T>,
    ) -> Option<ParameterTable> {
        let Message::ParamValue(v) = msg else {
            return None;
        };
        // Resolves the list request on the first value; a no-op afterwards.
        ex.offer(msg);
        if !self.is_active() {
            debug!("params: ignoring {} outside a download", field_text(&v.param_id));
            return None;
        }
        self.store(v)
    }

    pub fn fail(&mut self) {
        if self.is_active() {
            self.state = ParamState::Failed;
        }
    }

    fn store(&mut self, v: &PARAM_VALUE_DATA) -> Option<ParameterTable> {
        self.state = ParamState::AwaitingRest;
        let name = field_text(&v.param_id);
        let total = v.param_count as usize;
        if total != self.table.total() {
            debug!("params: vehicle reports {} parameters", total);
            self.table.resize(total);
        }
        let index = v.param_index as usize;
        if index >= total {
            debug!("params: {} index {} outside table of {}", name, index, total);
            return None;
        }
        self.table.slots[index] = Some(Param {
            name,
            value: v.param_value,
            param_type: v.param_type as u8,
        });

        let done = match self.policy {
            CompletionPolicy::LastIndex => index == total - 1,
            CompletionPolicy::AllSlots => self.table.is_filled(),
        };
        if !done {
            return None;
        }
        self.state = ParamState::Complete;
        info!("params: download complete ({}/{} received)", self.table.filled(), total);
        Some(self.table.clone())
    }
}
