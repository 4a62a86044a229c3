use thiserror::Error;

use crate::kind::MessageKind;

/// Why a frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("bad start marker 0x{0:02x}")]
    StartMarker(u8),

    #[error("truncated: {got} of {need} bytes")]
    Truncated { got: usize, need: usize },

    #[error("checksum mismatch: frame 0x{got:04x}, computed 0x{computed:04x}")]
    Checksum { got: u16, computed: u16 },

    #[error("{kind:?} payload is {got} bytes, expected {need}")]
    PayloadLength { kind: MessageKind, got: usize, need: usize },

    /// A field the catalog could not accept, such as an out of range enum.
    #[error("{kind:?} payload rejected: {reason}")]
    Field { kind: MessageKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] Malformed),

    #[error("payload of {0} bytes exceeds the 255 byte frame limit")]
    PayloadTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, WireError>;
