use bytes::Bytes;
use skylink_wire::{encode, FrameHeader, Message};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Fire-and-forget byte sink towards the transport.
pub trait FrameSink {
    fn send_frame(&mut self, frame: Bytes);
}

impl FrameSink for mpsc::UnboundedSender<Bytes> {
    fn send_frame(&mut self, frame: Bytes) {
        if self.send(frame).is_err() {
            warn!("transport writer gone, frame dropped");
        }
    }
}

impl FrameSink for Vec<Bytes> {
    fn send_frame(&mut self, frame: Bytes) {
        self.push(frame);
    }
}

/// Stamps our identity and a wrapping sequence number on every frame.
pub struct Outbound<S> {
    sink: S,
    hdr: FrameHeader,
    sent: u64,
}

impl<S: FrameSink> Outbound<S> {
    pub fn new(sink: S, sys_id: u8, comp_id: u8) -> Self {
        Self {
            sink,
            hdr: FrameHeader { system_id: sys_id, component_id: comp_id, sequence: 0 },
            sent: 0,
        }
    }

    pub fn send(&mut self, msg: &Message) {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        match encode(&self.hdr, msg) {
            Ok(frame) => {
                trace!(kind = ?msg.kind(), seq = self.hdr.sequence, "tx");
                self.sent += 1;
                self.sink.send_frame(frame);
            }
            Err(e) => warn!("dropping unencodable {:?}: {}", msg.kind(), e),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_wire::decode;
    use skylink_wire::dialect::HEARTBEAT_DATA;

    #[test]
    fn sequence_wraps_and_ids_are_stamped() {
        let mut out = Outbound::new(Vec::new(), 255, 190);
        for _ in 0..257 {
            out.send(&Message::Heartbeat(HEARTBEAT_DATA::default()));
        }
        let frames = out.sink();
        assert_eq!(frames.len(), 257);
        let (first, _) = decode(&frames[0]).unwrap();
        let (wrapped, _) = decode(&frames[255]).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(wrapped.sequence, 0);
        assert_eq!(first.system_id, 255);
        assert_eq!(first.component_id, 190);
    }
}
