use thiserror::Error;

use crate::message::RequestType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("length out of range: {length} bytes (max {max})")]
    LengthOutOfRange { length: u32, max: u32 },

    #[error("flags out of range: {0:#x} (3-bit field)")]
    FlagsOutOfRange(u8),

    #[error("payload overflow: response carries {length} bytes, buffer holds {capacity}")]
    PayloadOverflow { length: usize, capacity: usize },

    #[error("payload length mismatch: header declares {declared} bytes, got {actual}")]
    PayloadMismatch { declared: u32, actual: usize },

    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse { expected: RequestType, actual: RequestType },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
