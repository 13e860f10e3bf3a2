//! Client-side reassembly of chunked file responses

use shared::{CHUNK_LENGTH, CHUNK_SEPARATOR, RESPONSE_HEADER_LENGTH};

use crate::asset::archive::{ArchiveHeader, COMPRESSED_HEADER_LENGTH, UNCOMPRESSED_HEADER_LENGTH};
use crate::error::{FileError, StorageError};

/// One complete archive received from the file service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub package: u8,
    pub archive: u16,
    pub data: Vec<u8>,
}

/// Rebuilds responses from the raw stream, byte by byte
///
/// The archive's own container header tells how long the response is, so
/// no length travels on the wire.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    header: Vec<u8>,
    data: Vec<u8>,
    expected: Option<usize>,
    chunk: usize,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes bytes up to the end of the current response
    ///
    /// Returns the number of bytes used and the response if it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(usize, Option<Response>), FileError> {
        for (used, &byte) in bytes.iter().enumerate() {
            if let Some(response) = self.push_byte(byte)? {
                return Ok((used + 1, Some(response)));
            }
        }
        Ok((bytes.len(), None))
    }

    fn push_byte(&mut self, byte: u8) -> Result<Option<Response>, FileError> {
        if self.header.len() < RESPONSE_HEADER_LENGTH {
            self.header.push(byte);
            return Ok(None);
        }

        if self.chunk == CHUNK_LENGTH {
            if byte != CHUNK_SEPARATOR {
                return Err(FileError::MissingSeparator(byte));
            }
            self.chunk = 0;
            return Ok(None);
        }

        self.data.push(byte);
        self.chunk += 1;

        if self.expected.is_none() {
            self.expected = self.expected_length()?;
        }

        match self.expected {
            Some(expected) if self.data.len() >= expected => Ok(Some(self.finish())),
            _ => Ok(None),
        }
    }

    fn expected_length(&self) -> Result<Option<usize>, StorageError> {
        let available = self.data.len();
        if available < UNCOMPRESSED_HEADER_LENGTH {
            return Ok(None);
        }

        let needed = if self.data[0] == 0 {
            UNCOMPRESSED_HEADER_LENGTH
        } else {
            COMPRESSED_HEADER_LENGTH
        };
        if available < needed {
            return Ok(None);
        }

        Ok(Some(ArchiveHeader::parse(&self.data)?.encoded_length()))
    }

    fn finish(&mut self) -> Response {
        let header = std::mem::take(&mut self.header);
        let data = std::mem::take(&mut self.data);
        self.expected = None;
        self.chunk = 0;

        Response {
            package: header[0],
            archive: u16::from_be_bytes([header[1], header[2]]),
            data,
        }
    }
}
