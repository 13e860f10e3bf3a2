//! Wire-level building blocks shared by the archive server and its clients.
//!
//! - [`cursor`]: bounds-checked big-endian byte cursor with a bit-packing mode
//! - [`ring`]: fixed-capacity circular buffer for staging socket I/O
//! - [`message`]: descriptors, registries and the stream encoder/decoder

pub mod cursor;
pub mod error;
pub mod message;
pub mod ring;

pub use cursor::{BitCursor, ByteCursor};
pub use error::{CursorError, ProtocolError, RingError};
pub use message::{Descriptor, Kind, Message, Registry, Request, SizeClass, Status};
pub use ring::{Readable, RingBuffer, Writable};

/// Package holding one manifest archive per ordinary package
pub const MANIFEST_PACKAGE: u8 = 255;

/// Archive id, within [`MANIFEST_PACKAGE`], of the synthesized release manifest
pub const RELEASE_MANIFEST_ARCHIVE: u16 = 255;

/// Largest run of archive bytes in a file response before a separator
pub const CHUNK_LENGTH: usize = 2048;

/// Byte written between consecutive chunks of a file response
pub const CHUNK_SEPARATOR: u8 = 0xFF;

/// Package id (1 byte) followed by archive id (2 bytes)
pub const RESPONSE_HEADER_LENGTH: usize = 3;
