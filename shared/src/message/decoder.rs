//! Resumable decoder that turns a fragmented byte stream into messages

use std::sync::Arc;

use super::{Descriptor, Message, Registry, SizeClass};
use crate::cursor::ByteCursor;
use crate::error::ProtocolError;
use crate::ring::Readable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitIdentifier,
    AwaitLength(Descriptor),
    AwaitPayload(Descriptor, usize),
}

/// Stream decoder bound to one inbound [`Registry`]
///
/// Each call consumes only what the current state can use in full. When a
/// state needs more bytes than the source holds, nothing is read and
/// `Ok(None)` is returned, so the same decoder can be fed arbitrarily small
/// fragments across calls.
#[derive(Debug)]
pub struct StreamDecoder {
    registry: Arc<Registry>,
    state: DecodeState,
    scratch: Box<[u8]>,
}

impl StreamDecoder {
    /// `capacity` bounds the largest payload this decoder accepts
    pub fn new(registry: Arc<Registry>, capacity: usize) -> Self {
        Self {
            registry,
            state: DecodeState::AwaitIdentifier,
            scratch: vec![0; capacity.max(2)].into_boxed_slice(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns true between messages
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitIdentifier
    }

    pub fn decode<R>(&mut self, input: &mut R) -> Result<Option<Message>, ProtocolError>
    where
        R: Readable + ?Sized,
    {
        loop {
            match self.state {
                DecodeState::AwaitIdentifier => {
                    if input.readable() < 1 {
                        return Ok(None);
                    }
                    input.read(&mut self.scratch[..1])?;

                    let id = self.scratch[0];
                    let descriptor = self
                        .registry
                        .get(id)
                        .ok_or(ProtocolError::UnrecognizedMessage(id))?;
                    self.state = DecodeState::AwaitLength(descriptor);
                }
                DecodeState::AwaitLength(descriptor) => {
                    let length = match descriptor.size {
                        SizeClass::Fixed(n) => n,
                        SizeClass::VariableByte => {
                            if input.readable() < 1 {
                                return Ok(None);
                            }
                            input.read(&mut self.scratch[..1])?;
                            self.scratch[0] as usize
                        }
                        SizeClass::VariableShort => {
                            if input.readable() < 2 {
                                return Ok(None);
                            }
                            input.read(&mut self.scratch[..2])?;
                            u16::from_be_bytes([self.scratch[0], self.scratch[1]]) as usize
                        }
                    };

                    if length > self.scratch.len() {
                        return Err(ProtocolError::PayloadTooLarge {
                            id: descriptor.id,
                            length,
                            limit: self.scratch.len(),
                        });
                    }
                    self.state = DecodeState::AwaitPayload(descriptor, length);
                }
                DecodeState::AwaitPayload(descriptor, length) => {
                    if input.readable() < length {
                        return Ok(None);
                    }
                    if length > 0 {
                        input.read(&mut self.scratch[..length])?;
                    }

                    let mut payload = ByteCursor::new(&self.scratch[..length]);
                    let message = descriptor.kind.decode(&mut payload, length)?;

                    self.state = DecodeState::AwaitIdentifier;
                    return Ok(Some(message));
                }
            }
        }
    }
}
