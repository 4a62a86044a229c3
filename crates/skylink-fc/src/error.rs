use skylink_wire::{MessageKind, WireError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FcError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("sequence violation: expected item {expected}, got {got}")]
    SequenceViolation { expected: u16, got: u16 },

    #[error("no {expected:?} reply after {attempts} attempts")]
    RetryExhausted { expected: MessageKind, attempts: u32 },

    #[error("unknown flight mode {0:?}")]
    UnknownMode(String),

    #[error("refusing command: no heartbeat seen yet")]
    NotPresent,

    #[error("link task has stopped")]
    LinkClosed,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FcError>;
