//! The recognized message subset.
//!
//! Payload layout, field order and enum validation come from the `mavlink`
//! catalog; this module only picks the messages the link acts on out of it.

use bytes::Bytes;
use mavlink::{MavlinkVersion, Message as _, MessageData};

use crate::dialect::{
    MavMessage, MavMode, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, MISSION_ACK_DATA, MISSION_COUNT_DATA,
    MISSION_ITEM_DATA, MISSION_REQUEST_DATA, MISSION_REQUEST_LIST_DATA, PARAM_REQUEST_LIST_DATA,
    PARAM_VALUE_DATA, SET_MODE_DATA, STATUSTEXT_DATA, SYS_STATUS_DATA,
};
use crate::error::Malformed;
use crate::kind::MessageKind;

pub const PARAM_ID_LEN: usize = 16;
pub const STATUS_TEXT_LEN: usize = 50;

/// SET_MODE with an untyped `base_mode`.
///
/// The catalog types `base_mode` as `MAV_MODE`, which has no entry for the
/// bare custom-mode flag ArduPilot expects. The rest of the payload still
/// goes through the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetMode {
    pub custom_mode: u32,
    pub target_system: u8,
    pub base_mode: u8,
}

impl SetMode {
    // Offset of `base_mode` in the catalog layout (u32, u8, u8).
    const BASE_MODE_AT: usize = 5;

    fn ser(&self, buf: &mut [u8]) -> usize {
        let data = SET_MODE_DATA {
            custom_mode: self.custom_mode,
            target_system: self.target_system,
            base_mode: MavMode::MAV_MODE_PREFLIGHT,
        };
        let n = data.ser(MavlinkVersion::V1, buf);
        buf[Self::BASE_MODE_AT] = self.base_mode;
        n
    }

    fn deser(payload: &[u8]) -> Result<Self, mavlink::error::ParserError> {
        let mut raw = [0u8; SET_MODE_DATA::ENCODED_LEN];
        let n = payload.len().min(raw.len());
        raw[..n].copy_from_slice(&payload[..n]);
        let base_mode = raw[Self::BASE_MODE_AT];
        raw[Self::BASE_MODE_AT] = MavMode::MAV_MODE_PREFLIGHT as u8;
        let data = SET_MODE_DATA::deser(MavlinkVersion::V1, &raw)?;
        Ok(SetMode {
            custom_mode: data.custom_mode,
            target_system: data.target_system,
            base_mode,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat(HEARTBEAT_DATA),
    SysStatus(SYS_STATUS_DATA),
    SetMode(SetMode),
    ParamRequestList(PARAM_REQUEST_LIST_DATA),
    ParamValue(PARAM_VALUE_DATA),
    GlobalPositionInt(GLOBAL_POSITION_INT_DATA),
    MissionItem(MISSION_ITEM_DATA),
    MissionRequest(MISSION_REQUEST_DATA),
    MissionRequestList(MISSION_REQUEST_LIST_DATA),
    MissionCount(MISSION_COUNT_DATA),
    MissionAck(MISSION_ACK_DATA),
    StatusText(STATUSTEXT_DATA),
    /// Any tag outside the recognized subset, carried unexamined.
    Other { tag: u8, payload: Bytes },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Heartbeat(_) => MessageKind::Heartbeat,
            Message::SysStatus(_) => MessageKind::SysStatus,
            Message::SetMode(_) => MessageKind::SetMode,
            Message::ParamRequestList(_) => MessageKind::ParamRequestList,
            Message::ParamValue(_) => MessageKind::ParamValue,
            Message::GlobalPositionInt(_) => MessageKind::GlobalPositionInt,
            Message::MissionItem(_) => MessageKind::MissionItem,
            Message::MissionRequest(_) => MessageKind::MissionRequest,
            Message::MissionRequestList(_) => MessageKind::MissionRequestList,
            Message::MissionCount(_) => MessageKind::MissionCount,
            Message::MissionAck(_) => MessageKind::MissionAck,
            Message::StatusText(_) => MessageKind::StatusText,
            Message::Other { tag, .. } => MessageKind::Other(*tag),
        }
    }

    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            Message::Other { payload, .. } => payload.len(),
            known => known.kind().payload_len().unwrap_or_default(),
        }
    }

    /// Write the payload into `buf` and return its length. `buf` must hold
    /// `encoded_len()` bytes.
    pub(crate) fn write_payload(&self, buf: &mut [u8]) -> usize {
        let v = MavlinkVersion::V1;
        match self {
            Message::Heartbeat(m) => m.ser(v, buf),
            Message::SysStatus(m) => m.ser(v, buf),
            Message::SetMode(m) => m.ser(buf),
            Message::ParamRequestList(m) => m.ser(v, buf),
            Message::ParamValue(m) => m.ser(v, buf),
            Message::GlobalPositionInt(m) => m.ser(v, buf),
            Message::MissionItem(m) => m.ser(v, buf),
            Message::MissionRequest(m) => m.ser(v, buf),
            Message::MissionRequestList(m) => m.ser(v, buf),
            Message::MissionCount(m) => m.ser(v, buf),
            Message::MissionAck(m) => m.ser(v, buf),
            Message::StatusText(m) => m.ser(v, buf),
            Message::Other { payload, .. } => {
                buf[..payload.len()].copy_from_slice(payload);
                payload.len()
            }
        }
    }

    /// Parse a payload whose length has already been checked against
    /// `kind.payload_len()`.
    pub(crate) fn parse(kind: MessageKind, payload: &[u8]) -> Result<Message, Malformed> {
        let field_error = |e: mavlink::error::ParserError| Malformed::Field { kind, reason: e.to_string() };
        let tag = match kind {
            MessageKind::Other(tag) => {
                return Ok(Message::Other {
                    tag,
                    payload: Bytes::copy_from_slice(payload),
                })
            }
            MessageKind::SetMode => return SetMode::deser(payload).map(Message::SetMode).map_err(field_error),
            known => known.tag(),
        };

        let parsed = MavMessage::parse(MavlinkVersion::V1, tag as u32, payload).map_err(field_error)?;
        Ok(match parsed {
            MavMessage::HEARTBEAT(m) => Message::Heartbeat(m),
            MavMessage::SYS_STATUS(m) => Message::SysStatus(m),
            MavMessage::PARAM_REQUEST_LIST(m) => Message::ParamRequestList(m),
            MavMessage::PARAM_VALUE(m) => Message::ParamValue(m),
            MavMessage::GLOBAL_POSITION_INT(m) => Message::GlobalPositionInt(m),
            MavMessage::MISSION_ITEM(m) => Message::MissionItem(m),
            MavMessage::MISSION_REQUEST(m) => Message::MissionRequest(m),
            MavMessage::MISSION_REQUEST_LIST(m) => Message::MissionRequestList(m),
            MavMessage::MISSION_COUNT(m) => Message::MissionCount(m),
            MavMessage::MISSION_ACK(m) => Message::MissionAck(m),
            MavMessage::STATUSTEXT(m) => Message::StatusText(m),
            _ => Message::Other {
                tag,
                payload: Bytes::copy_from_slice(payload),
            },
        })
    }
}

/// NUL padded text field. Text longer than `N` bytes is cut at the last
/// character boundary that fits.
pub fn text_field<const N: usize>(text: &str) -> [u8; N] {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut field = [0u8; N];
    field[..end].copy_from_slice(&text.as_bytes()[..end]);
    field
}

/// Text up to the first NUL, or the whole field when it is full.
pub fn field_text(field: &[u8]) -> String {
    let end = field.iter().position(|c| *c == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
