//! The closed set of framed messages exchanged with clients
//!
//! Each message type has exactly one [`Descriptor`] naming its id, its
//! [`SizeClass`] and the [`Kind`] used to construct it when its payload
//! arrives. Inbound and outbound ids live in separate [`Registry`] values, so
//! the file-service request ids and the status reply ids may overlap.

mod decoder;
mod descriptor;
mod encoder;

pub use decoder::StreamDecoder;
pub use descriptor::{Descriptor, Registry, SizeClass};
pub use encoder::StreamEncoder;

use crate::cursor::ByteCursor;
use crate::error::ProtocolError;

pub const PASSIVE_REQUEST: Descriptor = Descriptor::new(0, SizeClass::Fixed(3), Kind::PassiveRequest);
pub const PRIORITY_REQUEST: Descriptor = Descriptor::new(1, SizeClass::Fixed(3), Kind::PriorityRequest);
pub const ONLINE_STATUS_UPDATE: Descriptor =
    Descriptor::new(2, SizeClass::Fixed(3), Kind::OnlineStatusUpdate);
pub const OFFLINE_STATUS_UPDATE: Descriptor =
    Descriptor::new(3, SizeClass::Fixed(3), Kind::OfflineStatusUpdate);
pub const FILE_HANDSHAKE: Descriptor = Descriptor::new(15, SizeClass::Fixed(4), Kind::FileHandshake);
pub const CUSTOM_REJECTION: Descriptor =
    Descriptor::new(29, SizeClass::VariableShort, Kind::CustomRejection);

/// Descriptors a client sends to the file service
pub fn file_service_descriptors() -> Vec<Descriptor> {
    vec![
        PASSIVE_REQUEST,
        PRIORITY_REQUEST,
        ONLINE_STATUS_UPDATE,
        OFFLINE_STATUS_UPDATE,
        FILE_HANDSHAKE,
    ]
}

/// Descriptors of the status replies a server sends
pub fn status_descriptors() -> Vec<Descriptor> {
    Status::ALL
        .iter()
        .map(|status| status.descriptor())
        .chain(std::iter::once(CUSTOM_REJECTION))
        .collect()
}

/// Identifies which [`Message`] variant a descriptor constructs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    PassiveRequest,
    PriorityRequest,
    OnlineStatusUpdate,
    OfflineStatusUpdate,
    FileHandshake,
    Status(Status),
    CustomRejection,
}

impl Kind {
    /// Builds a message from exactly `length` payload bytes
    pub fn decode<B: AsRef<[u8]>>(
        self,
        payload: &mut ByteCursor<B>,
        length: usize,
    ) -> Result<Message, ProtocolError> {
        let message = match self {
            Kind::PassiveRequest => Message::PassiveRequest(Request::decode(payload)?),
            Kind::PriorityRequest => Message::PriorityRequest(Request::decode(payload)?),
            Kind::OnlineStatusUpdate => {
                payload.skip(length)?;
                Message::OnlineStatusUpdate
            }
            Kind::OfflineStatusUpdate => {
                payload.skip(length)?;
                Message::OfflineStatusUpdate
            }
            Kind::FileHandshake => Message::FileHandshake {
                version: payload.get_u32()?,
            },
            Kind::Status(status) => Message::Status(status),
            Kind::CustomRejection => Message::CustomRejection(Rejection {
                top: payload.get_cstring()?,
                center: payload.get_cstring()?,
                bottom: payload.get_cstring()?,
            }),
        };
        Ok(message)
    }
}

/// An archive address requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    pub package: u8,
    pub archive: u16,
}

impl Request {
    pub fn new(package: u8, archive: u16) -> Self {
        Self { package, archive }
    }

    fn decode<B: AsRef<[u8]>>(payload: &mut ByteCursor<B>) -> Result<Self, ProtocolError> {
        Ok(Self {
            package: payload.get_u8()?,
            archive: payload.get_u16()?,
        })
    }

    fn encode<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        payload: &mut ByteCursor<B>,
    ) -> Result<(), ProtocolError> {
        payload.put_u8(self.package)?;
        payload.put_u16(self.archive)?;
        Ok(())
    }
}

/// Zero-payload status replies; the discriminant is the message id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Okay = 0,
    InvalidCredentials = 3,
    AccountDisabled = 4,
    AlreadyOnline = 5,
    UnsupportedVersion = 6,
    Full = 7,
    LoginLimitExceeded = 9,
    ServerUpdate = 14,
    ClosedBeta = 19,
    MalformedLoginPacket = 22,
    ErrorLoadingProfile = 24,
    BlockedAddress = 26,
    ServiceUnavailable = 27,
    EnterPin = 56,
    InvalidPin = 57,
}

impl Status {
    pub const ALL: [Status; 15] = [
        Status::Okay,
        Status::InvalidCredentials,
        Status::AccountDisabled,
        Status::AlreadyOnline,
        Status::UnsupportedVersion,
        Status::Full,
        Status::LoginLimitExceeded,
        Status::ServerUpdate,
        Status::ClosedBeta,
        Status::MalformedLoginPacket,
        Status::ErrorLoadingProfile,
        Status::BlockedAddress,
        Status::ServiceUnavailable,
        Status::EnterPin,
        Status::InvalidPin,
    ];

    pub const fn descriptor(self) -> Descriptor {
        Descriptor::new(self as u8, SizeClass::Fixed(0), Kind::Status(self))
    }
}

/// Rejection screen with three free-form text lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub top: String,
    pub center: String,
    pub bottom: String,
}

/// Every message either side of a connection can frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PassiveRequest(Request),
    PriorityRequest(Request),
    OnlineStatusUpdate,
    OfflineStatusUpdate,
    FileHandshake { version: u32 },
    Status(Status),
    CustomRejection(Rejection),
}

impl Message {
    pub fn descriptor(&self) -> Descriptor {
        match self {
            Message::PassiveRequest(_) => PASSIVE_REQUEST,
            Message::PriorityRequest(_) => PRIORITY_REQUEST,
            Message::OnlineStatusUpdate => ONLINE_STATUS_UPDATE,
            Message::OfflineStatusUpdate => OFFLINE_STATUS_UPDATE,
            Message::FileHandshake { .. } => FILE_HANDSHAKE,
            Message::Status(status) => status.descriptor(),
            Message::CustomRejection(_) => CUSTOM_REJECTION,
        }
    }

    pub fn id(&self) -> u8 {
        self.descriptor().id
    }

    /// Writes the payload only; framing is the encoder's job
    pub fn encode<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        payload: &mut ByteCursor<B>,
    ) -> Result<(), ProtocolError> {
        match self {
            Message::PassiveRequest(request) | Message::PriorityRequest(request) => {
                request.encode(payload)
            }
            // The client pads these to three bytes; the content carries no meaning here.
            Message::OnlineStatusUpdate | Message::OfflineStatusUpdate => {
                payload.put_bytes(&[0, 0, 0])?;
                Ok(())
            }
            Message::FileHandshake { version } => {
                payload.put_u32(*version)?;
                Ok(())
            }
            Message::Status(_) => Ok(()),
            Message::CustomRejection(rejection) => {
                payload.put_cstring(&rejection.top)?;
                payload.put_cstring(&rejection.center)?;
                payload.put_cstring(&rejection.bottom)?;
                Ok(())
            }
        }
    }
}
