//! Message descriptors and the immutable id -> descriptor registry

use super::Kind;
use crate::error::ProtocolError;

/// How the payload length of a message is known on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Payload is always exactly this many bytes; no prefix
    Fixed(usize),
    /// One length byte precedes the payload
    VariableByte,
    /// Two big-endian length bytes precede the payload
    VariableShort,
}

impl SizeClass {
    /// Number of prefix bytes that carry the payload length
    pub fn prefix_length(self) -> usize {
        match self {
            SizeClass::Fixed(_) => 0,
            SizeClass::VariableByte => 1,
            SizeClass::VariableShort => 2,
        }
    }

    /// Largest payload this size class can frame
    pub fn max_length(self) -> usize {
        match self {
            SizeClass::Fixed(n) => n,
            SizeClass::VariableByte => u8::MAX as usize,
            SizeClass::VariableShort => u16::MAX as usize,
        }
    }
}

/// Identity, framing and constructor of one message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub id: u8,
    pub size: SizeClass,
    pub kind: Kind,
}

impl Descriptor {
    pub const fn new(id: u8, size: SizeClass, kind: Kind) -> Self {
        Self { id, size, kind }
    }
}

/// Immutable mapping from message id to descriptor for one protocol direction
///
/// Built once at startup and shared by every decoder that reads that
/// direction. Two descriptors claiming the same id is a construction error;
/// separate registries may reuse ids freely.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: [Option<Descriptor>; 256],
}

impl Registry {
    pub fn new<I>(descriptors: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = Descriptor>,
    {
        let mut table = [None; 256];
        for descriptor in descriptors {
            let slot = &mut table[descriptor.id as usize];
            if slot.is_some() {
                return Err(ProtocolError::DuplicateDescriptor(descriptor.id));
            }
            *slot = Some(descriptor);
        }
        Ok(Self { descriptors: table })
    }

    pub fn get(&self, id: u8) -> Option<Descriptor> {
        self.descriptors[id as usize]
    }

    pub fn contains(&self, id: u8) -> bool {
        self.descriptors[id as usize].is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.descriptors.iter().filter_map(|d| *d)
    }
}
