//! Archive container: `[tag][compressed length][uncompressed length if tag != 0][payload]`

use std::io::{Cursor, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use shared::ByteCursor;

use crate::error::StorageError;

pub const UNCOMPRESSED_HEADER_LENGTH: usize = 5;
pub const COMPRESSED_HEADER_LENGTH: usize = 9;

/// Stream magic the container strips from bzip2 payloads
const BZIP2_MAGIC: [u8; 4] = *b"BZh9";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Bzip2 = 1,
    Gzip = 2,
}

impl TryFrom<u8> for Compression {
    type Error = StorageError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Bzip2),
            2 => Ok(Compression::Gzip),
            other => Err(StorageError::UnsupportedCompression(other)),
        }
    }
}

impl Compression {
    pub fn header_length(self) -> usize {
        match self {
            Compression::None => UNCOMPRESSED_HEADER_LENGTH,
            Compression::Bzip2 | Compression::Gzip => COMPRESSED_HEADER_LENGTH,
        }
    }
}

/// Parsed container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub compression: Compression,
    pub compressed_length: usize,
    pub uncompressed_length: usize,
}

impl ArchiveHeader {
    /// Reads the header from the start of `bytes`; the payload may be absent
    pub fn parse(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < UNCOMPRESSED_HEADER_LENGTH {
            return Err(StorageError::Truncated {
                needed: UNCOMPRESSED_HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut cursor = ByteCursor::new(bytes);
        let compression = Compression::try_from(cursor.get_u8()?)?;
        let compressed_length = cursor.get_u32()? as usize;

        let uncompressed_length = match compression {
            Compression::None => compressed_length,
            Compression::Bzip2 | Compression::Gzip => {
                if bytes.len() < COMPRESSED_HEADER_LENGTH {
                    return Err(StorageError::Truncated {
                        needed: COMPRESSED_HEADER_LENGTH,
                        actual: bytes.len(),
                    });
                }
                cursor.get_u32()? as usize
            }
        };

        Ok(Self {
            compression,
            compressed_length,
            uncompressed_length,
        })
    }

    /// Length of header plus payload
    pub fn encoded_length(&self) -> usize {
        self.compression.header_length() + self.compressed_length
    }
}

fn payload<'a>(bytes: &'a [u8], header: &ArchiveHeader) -> Result<&'a [u8], StorageError> {
    let needed = header.encoded_length();
    if bytes.len() < needed {
        return Err(StorageError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[header.compression.header_length()..needed])
}

/// Unpacks a whole container (header and payload)
pub fn decompress_archive(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let header = ArchiveHeader::parse(bytes)?;
    let packed = payload(bytes, &header)?;

    let unpacked = match header.compression {
        Compression::None => packed.to_vec(),
        Compression::Bzip2 => {
            let stream = Cursor::new(BZIP2_MAGIC).chain(packed);
            read_exactly(BzDecoder::new(stream), header.uncompressed_length)?
        }
        Compression::Gzip => read_exactly(GzDecoder::new(packed), header.uncompressed_length)?,
    };
    Ok(unpacked)
}

fn read_exactly<R: Read>(reader: R, expected: usize) -> Result<Vec<u8>, StorageError> {
    let mut unpacked = Vec::with_capacity(expected);
    reader.take(expected as u64).read_to_end(&mut unpacked)?;
    if unpacked.len() != expected {
        return Err(StorageError::LengthMismatch {
            expected,
            actual: unpacked.len(),
        });
    }
    Ok(unpacked)
}

/// Packs `data` into a container using the given compression
pub fn compress_archive(compression: Compression, data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let packed = match compression {
        Compression::None => data.to_vec(),
        Compression::Bzip2 => {
            let level = u32::from(BZIP2_MAGIC[3] - b'0');
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::new(level));
            encoder.write_all(data)?;
            let stream = encoder.finish()?;
            stream[BZIP2_MAGIC.len()..].to_vec()
        }
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };

    let mut archive = ByteCursor::with_length(compression.header_length() + packed.len());
    archive.put_u8(compression as u8)?;
    archive.put_u32(packed.len() as u32)?;
    if compression != Compression::None {
        archive.put_u32(data.len() as u32)?;
    }
    archive.put_bytes(&packed)?;
    Ok(archive.into_inner())
}

/// Drops anything stored after the container, such as a trailing version footer
pub fn trim_archive(bytes: &[u8]) -> Result<&[u8], StorageError> {
    let header = ArchiveHeader::parse(bytes)?;
    let end = header.encoded_length();
    if bytes.len() < end {
        return Err(StorageError::Truncated {
            needed: end,
            actual: bytes.len(),
        });
    }
    Ok(&bytes[..end])
}
