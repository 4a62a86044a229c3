use anyhow::Result;
use skylink_wire::{decode, FrameSplitter, Message};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::runtime::open_serial;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

/// Try every device/baud pair until one yields a valid heartbeat from
/// `target_sys`.
pub async fn autodetect_fc(
    candidate_devs: Vec<String>,
    candidate_bauds: Vec<u32>,
    heartbeat_timeout: Duration,
    target_sys: u8,
) -> Result<AutodetectResult> {
    let mut probes = Vec::new();

    for dev in candidate_devs {
        for baud in &candidate_bauds {
            let start = Instant::now();
            let note = match open_serial(&dev, *baud) {
                Ok(mut port) => {
                    let wait = tokio::time::timeout(heartbeat_timeout, wait_for_heartbeat(&mut port, target_sys)).await;
                    match wait {
                        Ok(Ok(Some(rejected))) => {
                            let elapsed_ms = start.elapsed().as_millis() as u64;
                            probes.push(ProbeResult {
                                dev: dev.clone(),
                                baud: *baud,
                                hb_seen: true,
                                elapsed_ms,
                                note: format!("heartbeat ({} bad frames first)", rejected),
                            });
                            info!("fc autodetect: OK {} @ {}", dev, baud);
                            return Ok(AutodetectResult { chosen: Some((dev, *baud)), probes });
                        }
                        Ok(Ok(None)) => "port closed".to_string(),
                        Ok(Err(e)) => format!("read failed: {}", e),
                        Err(_) => "no heartbeat".to_string(),
                    }
                }
                Err(e) => {
                    warn!("fc autodetect probe failed dev={} baud={} err={:#}", dev, baud, e);
                    format!("open failed: {:#}", e)
                }
            };
            debug!("fc autodetect: {} @ {}: {}", dev, baud, note);

            probes.push(ProbeResult {
                dev: dev.clone(),
                baud: *baud,
                hb_seen: false,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });
        }
    }

    Ok(AutodetectResult { chosen: None, probes })
}

/// Read until a heartbeat from `target_sys` decodes. Returns how many frames
/// were rejected on the way, `None` on end of stream.
async fn wait_for_heartbeat<R: AsyncRead + Unpin>(port: &mut R, target_sys: u8) -> std::io::Result<Option<usize>> {
    let mut split = FrameSplitter::new();
    let mut buf = [0u8; 256];
    let mut rejected = 0usize;
    loop {
        let n = port.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        split.push(&buf[..n]);
        while let Some(frame) = split.next_frame() {
            match decode(&frame) {
                Ok((h, Message::Heartbeat(_))) if h.system_id == target_sys => return Ok(Some(rejected)),
                Ok(_) => {}
                Err(_) => rejected += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_wire::dialect::{MavSeverity, HEARTBEAT_DATA, STATUSTEXT_DATA};
    use skylink_wire::{encode, text_field, FrameHeader};

    #[tokio::test]
    async fn heartbeat_found_after_noise() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0x00, 0x11, 0x22]);
        let mut bad = encode(&FrameHeader { sequence: 0, system_id: 1, component_id: 1 }, &Message::Heartbeat(HEARTBEAT_DATA::default())).unwrap().to_vec();
        bad[8] ^= 0x40;
        let text = Message::StatusText(STATUSTEXT_DATA { severity: MavSeverity::MAV_SEVERITY_INFO, text: text_field("boot") });
        let hb = Message::Heartbeat(HEARTBEAT_DATA::default());
        stream.extend_from_slice(&bad);
        stream.extend_from_slice(&encode(&FrameHeader { sequence: 1, system_id: 1, component_id: 1 }, &text).unwrap());
        stream.extend_from_slice(&encode(&FrameHeader { sequence: 2, system_id: 7, component_id: 1 }, &hb).unwrap());
        stream.extend_from_slice(&encode(&FrameHeader { sequence: 3, system_id: 1, component_id: 1 }, &hb).unwrap());

        let mut reader = stream.as_slice();
        let got = wait_for_heartbeat(&mut reader, 1).await.unwrap();
        assert_eq!(got, Some(1));
    }

    #[tokio::test]
    async fn end_of_stream_without_heartbeat() {
        let mut reader: &[u8] = &[0x01, 0x02, 0x03];
        assert_eq!(wait_for_heartbeat(&mut reader, 1).await.unwrap(), None);
    }
}
