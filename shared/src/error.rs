//! Error types for the wire-level building blocks

use thiserror::Error;

/// Errors raised by [`crate::ByteCursor`] and [`crate::BitCursor`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor out of range: {requested} bytes requested at offset {offset} of {length}")]
    OutOfRange {
        offset: usize,
        requested: usize,
        length: usize,
    },

    #[error("bit cursor out of range: {requested} bits requested at bit {bit_offset} of {bit_length}")]
    BitsOutOfRange {
        bit_offset: usize,
        requested: usize,
        bit_length: usize,
    },

    #[error("bit count {0} exceeds 32")]
    TooManyBits(u32),

    #[error("string starting at offset {0} has no terminator")]
    MissingTerminator(usize),

    #[error("string contains an interior terminator")]
    InteriorTerminator,

    #[error("invalid boolean byte {0}")]
    InvalidBoolean(u8),
}

/// Errors raised by [`crate::RingBuffer`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("short write: {written} of {requested} bytes fit")]
    ShortWrite { written: usize, requested: usize },

    #[error("no readable bytes")]
    Empty,
}

/// Errors raised while framing messages onto or off a byte stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unrecognized message {0}")]
    UnrecognizedMessage(u8),

    #[error("message {0} is claimed by more than one descriptor")]
    DuplicateDescriptor(u8),

    #[error("message {id} declares {length} payload bytes, limit is {limit}")]
    PayloadTooLarge { id: u8, length: usize, limit: usize },

    #[error("message {id} is fixed at {expected} bytes but encoded {actual}")]
    LengthMismatch {
        id: u8,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Ring(#[from] RingError),
}
