/// Initial accumulator value.
pub const X25_INIT: u16 = 0xFFFF;

/// Fold one byte into the running X.25 (CRC-16/MCRF4XX) accumulator.
#[inline]
pub fn accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0x00FF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

pub fn accumulate_all(bytes: &[u8], crc: u16) -> u16 {
    bytes.iter().fold(crc, |acc, b| accumulate(*b, acc))
}

/// Frame checksum: bytes 1..=5+len of the frame, then the tag seed.
pub fn frame_checksum(header_and_payload: &[u8], seed: u8) -> u16 {
    accumulate(seed, accumulate_all(header_and_payload, X25_INIT))
}
