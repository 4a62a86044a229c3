use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crc::frame_checksum;
use crate::error::{Malformed, Result, WireError};
use crate::kind::MessageKind;
use crate::message::Message;

pub const START_MARKER: u8 = 0xFE;
pub const HEADER_LEN: usize = 6;
pub const CHECKSUM_LEN: usize = 2;
/// Header plus checksum; a frame is always `FRAME_OVERHEAD + payload_len` bytes.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CHECKSUM_LEN;
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Wraps at 256. Loss telemetry only.
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
}

/// Frame `msg` behind `header`.
pub fn encode(header: &FrameHeader, msg: &Message) -> Result<Bytes> {
    let len = msg.encoded_len();
    if len > MAX_PAYLOAD_LEN {
        return Err(WireError::PayloadTooLarge(len));
    }
    let kind = msg.kind();

    let mut out = BytesMut::with_capacity(FRAME_OVERHEAD + len);
    out.put_u8(START_MARKER);
    out.put_u8(len as u8);
    out.put_u8(header.sequence);
    out.put_u8(header.system_id);
    out.put_u8(header.component_id);
    out.put_u8(kind.tag());
    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    let written = msg.write_payload(&mut payload[..len]);
    debug_assert_eq!(written, len);
    out.put_slice(&payload[..len]);

    let crc = frame_checksum(&out[1..], kind.seed());
    out.put_u16_le(crc);
    Ok(out.freeze())
}

/// Parse and validate one complete frame.
pub fn decode(buf: &[u8]) -> Result<(FrameHeader, Message)> {
    if buf.len() < FRAME_OVERHEAD {
        return Err(Malformed::Truncated { got: buf.len(), need: FRAME_OVERHEAD }.into());
    }
    if buf[0] != START_MARKER {
        return Err(Malformed::StartMarker(buf[0]).into());
    }
    let len = buf[1] as usize;
    let total = FRAME_OVERHEAD + len;
    if buf.len() < total {
        return Err(Malformed::Truncated { got: buf.len(), need: total }.into());
    }

    let kind = MessageKind::from_tag(buf[5]);
    let body = &buf[1..HEADER_LEN + len];
    let mut trailer = &buf[HEADER_LEN + len..total];
    let got = trailer.get_u16_le();
    let computed = frame_checksum(body, kind.seed());
    if got != computed {
        return Err(Malformed::Checksum { got, computed }.into());
    }

    if let Some(need) = kind.payload_len() {
        if need != len {
            return Err(Malformed::PayloadLength { kind, got: len, need }.into());
        }
    }

    let header = FrameHeader {
        sequence: buf[2],
        system_id: buf[3],
        component_id: buf[4],
    };
    let payload = &buf[HEADER_LEN..HEADER_LEN + len];
    Ok((header, Message::parse(kind, payload)?))
}

/// Splits a raw byte stream into candidate frames.
///
/// Only framing is done here: bytes ahead of a start marker are skipped and a
/// frame is yielded once `8 + len` bytes are buffered. Checksums are left to
/// [`decode`].
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: BytesMut,
    skipped: u64,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn next_frame(&mut self) -> Option<Bytes> {
        match self.buf.iter().position(|b| *b == START_MARKER) {
            Some(0) => {}
            Some(at) => {
                self.skipped += at as u64;
                self.buf.advance(at);
            }
            None => {
                self.skipped += self.buf.len() as u64;
                self.buf.clear();
                return None;
            }
        }

        if self.buf.len() < 2 {
            return None;
        }
        let total = FRAME_OVERHEAD + self.buf[1] as usize;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return None;
        }
        Some(self.buf.split_to(total).freeze())
    }

    /// Bytes discarded while hunting for a start marker.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{
        MavAutopilot, MavCmd, MavFrame, MavModeFlag, MavSeverity, MavState, MavType, GLOBAL_POSITION_INT_DATA,
        HEARTBEAT_DATA, MISSION_COUNT_DATA, MISSION_ITEM_DATA, STATUSTEXT_DATA,
    };
    use crate::message::text_field;

    fn hdr(sequence: u8) -> FrameHeader {
        FrameHeader { sequence, system_id: 1, component_id: 1 }
    }

    fn sample_item() -> Message {
        Message::MissionItem(MISSION_ITEM_DATA {
            x: 47.397_74,
            y: 8.545_594,
            z: 30.0,
            seq: 3,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            target_system: 255,
            target_component: 190,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            autocontinue: 1,
            ..Default::default()
        })
    }

    fn fixed_wing_heartbeat() -> HEARTBEAT_DATA {
        HEARTBEAT_DATA {
            custom_mode: 11,
            mavtype: MavType::MAV_TYPE_FIXED_WING,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED | MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }
    }

    #[test]
    fn roundtrip_recognized_messages() {
        let msgs = [
            sample_item(),
            Message::Heartbeat(fixed_wing_heartbeat()),
            Message::GlobalPositionInt(GLOBAL_POSITION_INT_DATA {
                time_boot_ms: 9_000,
                lat: 473_977_400,
                lon: 85_455_940,
                alt: 500_000,
                relative_alt: 30_000,
                vx: -12,
                vy: 4,
                vz: 0,
                hdg: 27_000,
            }),
            Message::StatusText(STATUSTEXT_DATA {
                severity: MavSeverity::MAV_SEVERITY_WARNING,
                text: text_field("PreArm: Check fence"),
            }),
        ];
        for (i, msg) in msgs.iter().enumerate() {
            let frame = encode(&hdr(i as u8), msg).unwrap();
            assert_eq!(frame.len(), FRAME_OVERHEAD + msg.kind().payload_len().unwrap());
            let (h, back) = decode(&frame).unwrap();
            assert_eq!(h, hdr(i as u8));
            assert_eq!(&back, msg);
        }
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let msg = Message::MissionCount(MISSION_COUNT_DATA { count: 3, target_system: 255, target_component: 190 });
        let frame = encode(&FrameHeader { sequence: 7, system_id: 1, component_id: 1 }, &msg).unwrap();
        assert_eq!(&frame[..HEADER_LEN], &[0xFE, 4, 7, 1, 1, 44]);
        assert_eq!(&frame[HEADER_LEN..HEADER_LEN + 4], &[3, 0, 255, 190]);
        let crc = frame_checksum(&frame[1..HEADER_LEN + 4], 221);
        assert_eq!(&frame[HEADER_LEN + 4..], &crc.to_le_bytes());
    }

    #[test]
    fn agrees_with_catalog_framing() {
        let reference = crate::dialect::MavMessage::HEARTBEAT(fixed_wing_heartbeat());
        let mut wire = Vec::new();
        let header = mavlink::MavHeader { system_id: 1, component_id: 1, sequence: 42 };
        mavlink::write_v1_msg(&mut wire, header, &reference).unwrap();

        let (h, msg) = decode(&wire).unwrap();
        assert_eq!(h, FrameHeader { sequence: 42, system_id: 1, component_id: 1 });
        assert_eq!(msg, Message::Heartbeat(fixed_wing_heartbeat()));
        assert_eq!(encode(&h, &msg).unwrap().as_ref(), wire.as_slice());
    }

    #[test]
    fn any_flipped_payload_byte_is_rejected() {
        let frame = encode(&hdr(1), &sample_item()).unwrap();
        for i in 1..frame.len() - CHECKSUM_LEN {
            let mut bad = frame.to_vec();
            bad[i] ^= 0x01;
            let err = decode(&bad).unwrap_err();
            assert!(matches!(err, WireError::MalformedFrame(_)), "byte {i}: {err:?}");
        }
    }

    #[test]
    fn truncated_and_marker_errors() {
        let frame = encode(&hdr(1), &sample_item()).unwrap();
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(WireError::MalformedFrame(Malformed::Truncated { .. }))
        ));
        let mut bad = frame.to_vec();
        bad[0] = 0x55;
        assert_eq!(decode(&bad), Err(Malformed::StartMarker(0x55).into()));
        assert!(decode(&[0xFE, 0, 0]).is_err());
    }

    #[test]
    fn short_known_payload_is_rejected() {
        // A heartbeat tag with a 4 byte payload and an otherwise valid checksum.
        let mut raw = vec![START_MARKER, 4, 0, 1, 1, 0, 1, 2, 3, 4];
        let crc = frame_checksum(&raw[1..], MessageKind::Heartbeat.seed());
        raw.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(
            decode(&raw),
            Err(Malformed::PayloadLength { kind: MessageKind::Heartbeat, got: 4, need: 9 }.into())
        );
    }

    #[test]
    fn invalid_field_with_good_checksum_is_malformed() {
        // MISSION_ACK whose result byte is outside MAV_MISSION_RESULT.
        let mut raw = vec![START_MARKER, 3, 0, 1, 1, 47, 255, 190, 0xEE];
        let crc = frame_checksum(&raw[1..], MessageKind::MissionAck.seed());
        raw.extend_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            decode(&raw),
            Err(WireError::MalformedFrame(Malformed::Field { kind: MessageKind::MissionAck, .. }))
        ));
    }

    #[test]
    fn unknown_tag_passes_through() {
        let msg = Message::Other { tag: 59, payload: Bytes::from_static(&[1, 2, 3, 4, 5]) };
        let frame = encode(&hdr(0), &msg).unwrap();
        let (_, back) = decode(&frame).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn oversized_other_is_refused() {
        let msg = Message::Other { tag: 200, payload: Bytes::from(vec![0u8; 300]) };
        assert_eq!(encode(&hdr(0), &msg), Err(WireError::PayloadTooLarge(300)));
    }

    #[test]
    fn splitter_resyncs_and_waits_for_full_frames() {
        let a = encode(&hdr(1), &sample_item()).unwrap();
        let b = encode(&hdr(2), &Message::Heartbeat(HEARTBEAT_DATA::default())).unwrap();

        let mut split = FrameSplitter::new();
        split.push(&[0x00, 0x13, 0x37]);
        split.push(&a[..10]);
        assert!(split.next_frame().is_none());
        assert_eq!(split.skipped(), 3);

        split.push(&a[10..]);
        split.push(&b[..3]);
        assert_eq!(split.next_frame().as_deref(), Some(a.as_ref()));
        assert!(split.next_frame().is_none());

        split.push(&b[3..]);
        assert_eq!(split.next_frame().as_deref(), Some(b.as_ref()));
        assert_eq!(split.buffered(), 0);
    }
}
