//! Read-only accessor for the block-chained archive cache
//!
//! The cache is one shared block file plus one index file per package.
//! An index file is a flat array of 6-byte records, `(3-byte length,
//! 3-byte first block)`, addressed by archive id. The block file is a
//! sequence of 520-byte blocks, each an 8-byte header
//! `(archive, chunk, next block, package)` followed by up to 512 payload
//! bytes. An archive's blocks form a singly linked chain ending at block 0.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use parking_lot::Mutex;
use shared::MANIFEST_PACKAGE;

use crate::error::StorageError;

pub const INDEX_RECORD_LENGTH: usize = 6;
pub const BLOCK_HEADER_LENGTH: usize = 8;
pub const BLOCK_PAYLOAD_LENGTH: usize = 512;
pub const BLOCK_LENGTH: usize = BLOCK_HEADER_LENGTH + BLOCK_PAYLOAD_LENGTH;

/// Block number that terminates a chain
pub const END_OF_ARCHIVE: u32 = 0;

pub const BLOCKS_FILE_NAME: &str = "main_file_cache.dat2";

pub fn index_file_name(package: u8) -> String {
    format!("main_file_cache.idx{package}")
}

fn u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Header at the front of every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub archive: u16,
    pub chunk: u16,
    pub next_block: u32,
    pub package: u8,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8; BLOCK_HEADER_LENGTH]) -> Self {
        Self {
            archive: u16::from_be_bytes([bytes[0], bytes[1]]),
            chunk: u16::from_be_bytes([bytes[2], bytes[3]]),
            next_block: u24(&bytes[4..7]),
            package: bytes[7],
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_LENGTH] {
        let archive = self.archive.to_be_bytes();
        let chunk = self.chunk.to_be_bytes();
        let next = self.next_block.to_be_bytes();
        [
            archive[0], archive[1], chunk[0], chunk[1], next[1], next[2], next[3], self.package,
        ]
    }

    fn owned_by(&self, package: u8, archive: u16, chunk: u16) -> bool {
        self.package == package && self.archive == archive && self.chunk == chunk
    }
}

struct CacheFiles {
    blocks: File,
    manifest_index: File,
    indexes: Vec<File>,
}

impl CacheFiles {
    fn index(&mut self, package: u8) -> Result<&mut File, StorageError> {
        if package == MANIFEST_PACKAGE {
            return Ok(&mut self.manifest_index);
        }
        self.indexes
            .get_mut(package as usize)
            .ok_or(StorageError::MissingIndex(package))
    }
}

fn read_at(file: &mut File, position: u64, buffer: &mut [u8]) -> Result<(), StorageError> {
    file.seek(SeekFrom::Start(position))?;
    file.read_exact(buffer)?;
    Ok(())
}

/// Shared, lock-protected handles onto an on-disk cache
pub struct Cache {
    files: Mutex<CacheFiles>,
    package_count: usize,
}

impl Cache {
    /// Opens the block file, the manifest index and `package_count` package indexes
    pub fn open(root: impl AsRef<Path>, package_count: usize) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let blocks = File::open(root.join(BLOCKS_FILE_NAME))?;
        let manifest_index = File::open(root.join(index_file_name(MANIFEST_PACKAGE)))?;

        let indexes = (0..package_count)
            .map(|package| File::open(root.join(index_file_name(package as u8))))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Opened cache at {:?} with {} packages", root, package_count);

        Ok(Self {
            files: Mutex::new(CacheFiles {
                blocks,
                manifest_index,
                indexes,
            }),
            package_count,
        })
    }

    /// Number of ordinary packages, which is also the number of manifests
    pub fn package_count(&self) -> usize {
        self.package_count
    }

    /// Reads an archive by walking its block chain
    pub fn get(&self, package: u8, archive: u16) -> Result<Vec<u8>, StorageError> {
        let mut files = self.files.lock();

        let index = files.index(package)?;
        let index_length = index.metadata()?.len();
        let record_position = u64::from(archive) * INDEX_RECORD_LENGTH as u64;
        if record_position + INDEX_RECORD_LENGTH as u64 > index_length {
            return Err(StorageError::ArchiveNotFound { package, archive });
        }

        let mut record = [0u8; INDEX_RECORD_LENGTH];
        read_at(index, record_position, &mut record)?;

        let length = u24(&record[0..3]) as usize;
        let mut block = u24(&record[3..6]);

        let blocks_length = files.blocks.metadata()?.len();
        let mut result = vec![0u8; length];
        let mut buffer = [0u8; BLOCK_LENGTH];
        let mut offset = 0;
        let mut chunk: u16 = 0;

        while offset < length {
            if block == END_OF_ARCHIVE {
                return Err(StorageError::PrematureEnd {
                    package,
                    archive,
                    read: offset,
                    length,
                });
            }

            let read = (length - offset).min(BLOCK_PAYLOAD_LENGTH);
            let position = u64::from(block) * BLOCK_LENGTH as u64;
            if position + (BLOCK_HEADER_LENGTH + read) as u64 > blocks_length {
                return Err(StorageError::UnexpectedEof { block });
            }

            read_at(
                &mut files.blocks,
                position,
                &mut buffer[..BLOCK_HEADER_LENGTH + read],
            )?;

            let mut header_bytes = [0u8; BLOCK_HEADER_LENGTH];
            header_bytes.copy_from_slice(&buffer[..BLOCK_HEADER_LENGTH]);
            let header = BlockHeader::parse(&header_bytes);

            if !header.owned_by(package, archive, chunk) {
                return Err(StorageError::InvalidBlockHeader {
                    block,
                    expected: BlockHeader {
                        archive,
                        chunk,
                        next_block: header.next_block,
                        package,
                    },
                    found: header,
                });
            }

            result[offset..offset + read]
                .copy_from_slice(&buffer[BLOCK_HEADER_LENGTH..BLOCK_HEADER_LENGTH + read]);

            block = header.next_block;
            offset += read;
            chunk = chunk.wrapping_add(1);
        }

        Ok(result)
    }
}
