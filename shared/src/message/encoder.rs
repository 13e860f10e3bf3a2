//! Frames outbound messages as `[id][0|1|2 byte length][payload]`

use super::{Message, SizeClass};
use crate::cursor::ByteCursor;
use crate::error::{ProtocolError, RingError};
use crate::ring::Writable;

/// Stateless apart from its scratch space, which bounds the largest frame
#[derive(Debug)]
pub struct StreamEncoder {
    scratch: Box<[u8]>,
}

impl StreamEncoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            scratch: vec![0; capacity].into_boxed_slice(),
        }
    }

    /// Encodes one message and hands the whole frame to `output` in one write
    pub fn encode<W>(&mut self, message: &Message, output: &mut W) -> Result<(), ProtocolError>
    where
        W: Writable + ?Sized,
    {
        let descriptor = message.descriptor();
        let mut frame = ByteCursor::new(&mut self.scratch[..]);

        frame.put_u8(descriptor.id)?;

        // Reserve the length prefix and come back to it once the payload is known.
        let start = frame.offset();
        let prefix = descriptor.size.prefix_length();
        frame.skip(prefix)?;

        message.encode(&mut frame)?;

        let end = frame.offset();
        let length = end - start - prefix;

        match descriptor.size {
            SizeClass::Fixed(expected) => {
                if length != expected {
                    return Err(ProtocolError::LengthMismatch {
                        id: descriptor.id,
                        expected,
                        actual: length,
                    });
                }
            }
            SizeClass::VariableByte | SizeClass::VariableShort => {
                let limit = descriptor.size.max_length();
                if length > limit {
                    return Err(ProtocolError::PayloadTooLarge {
                        id: descriptor.id,
                        length,
                        limit,
                    });
                }

                frame.set_offset(start)?;
                if prefix == 1 {
                    frame.put_u8(length as u8)?;
                } else {
                    frame.put_u16(length as u16)?;
                }
            }
        }

        if output.writable() < end {
            return Err(RingError::ShortWrite {
                written: 0,
                requested: end,
            }
            .into());
        }
        output.write(&self.scratch[..end])?;
        Ok(())
    }

    pub fn encode_to_vec(&mut self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = Vec::new();
        self.encode(message, &mut bytes)?;
        Ok(bytes)
    }
}
