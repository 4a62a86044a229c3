//! Wire codec for the v1 telemetry protocol: framing, the running checksum
//! and typed payloads for the messages the link acts on.

pub mod crc;
pub mod error;
pub mod frame;
pub mod kind;
pub mod message;

/// Message catalog the typed payloads come from.
pub use mavlink::ardupilotmega as dialect;

pub use error::{Malformed, WireError};
pub use frame::{decode, encode, FrameHeader, FrameSplitter};
pub use kind::MessageKind;
pub use message::*;
