use mavlink::{Message as _, MessageData};
use serde::Serialize;

use crate::dialect::{
    MavMessage, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, MISSION_ACK_DATA, MISSION_COUNT_DATA, MISSION_ITEM_DATA,
    MISSION_REQUEST_DATA, MISSION_REQUEST_LIST_DATA, PARAM_REQUEST_LIST_DATA, PARAM_VALUE_DATA, SET_MODE_DATA,
    STATUSTEXT_DATA, SYS_STATUS_DATA,
};

/// Message-type tag. The variants are the subset the link reasons about;
/// everything else travels as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    Heartbeat,
    SysStatus,
    SetMode,
    ParamRequestList,
    ParamValue,
    GlobalPositionInt,
    MissionItem,
    MissionRequest,
    MissionRequestList,
    MissionCount,
    MissionAck,
    StatusText,
    Other(u8),
}

// (kind, tag, payload length, checksum seed)
type Entry = (MessageKind, u8, usize, u8);

const fn entry<D: MessageData>(kind: MessageKind) -> Entry {
    (kind, D::ID as u8, D::ENCODED_LEN, D::EXTRA_CRC)
}

const KNOWN: &[Entry] = &[
    entry::<HEARTBEAT_DATA>(MessageKind::Heartbeat),
    entry::<SYS_STATUS_DATA>(MessageKind::SysStatus),
    entry::<SET_MODE_DATA>(MessageKind::SetMode),
    entry::<PARAM_REQUEST_LIST_DATA>(MessageKind::ParamRequestList),
    entry::<PARAM_VALUE_DATA>(MessageKind::ParamValue),
    entry::<GLOBAL_POSITION_INT_DATA>(MessageKind::GlobalPositionInt),
    entry::<MISSION_ITEM_DATA>(MessageKind::MissionItem),
    entry::<MISSION_REQUEST_DATA>(MessageKind::MissionRequest),
    entry::<MISSION_REQUEST_LIST_DATA>(MessageKind::MissionRequestList),
    entry::<MISSION_COUNT_DATA>(MessageKind::MissionCount),
    entry::<MISSION_ACK_DATA>(MessageKind::MissionAck),
    entry::<STATUSTEXT_DATA>(MessageKind::StatusText),
];

impl MessageKind {
    pub fn from_tag(tag: u8) -> Self {
        KNOWN
            .iter()
            .find(|(_, t, _, _)| *t == tag)
            .map(|(k, _, _, _)| *k)
            .unwrap_or(MessageKind::Other(tag))
    }

    pub fn tag(self) -> u8 {
        match self {
            MessageKind::Other(tag) => tag,
            known => Self::entry(known).map(|(_, t, _, _)| *t).unwrap_or_default(),
        }
    }

    /// Fixed payload length, `None` for pass-through kinds.
    pub fn payload_len(self) -> Option<usize> {
        Self::entry(self).map(|(_, _, len, _)| *len)
    }

    /// Per-tag byte folded into the checksum after the payload.
    pub fn seed(self) -> u8 {
        match Self::entry(self) {
            Some((_, _, _, seed)) => *seed,
            None => catalog_seed(self.tag()),
        }
    }

    fn entry(kind: MessageKind) -> Option<&'static Entry> {
        KNOWN.iter().find(|(k, _, _, _)| *k == kind)
    }
}

fn catalog_seed(tag: u8) -> u8 {
    MavMessage::extra_crc(tag as u32)
}
