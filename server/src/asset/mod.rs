//! On-disk archive cache, archive containers and the memoizing storage layer

pub mod archive;
pub mod cache;
pub mod manifest;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{compress_archive, decompress_archive, trim_archive, ArchiveHeader, Compression};
pub use cache::{BlockHeader, Cache};
pub use manifest::create_release_manifest;
pub use storage::Storage;

use crate::error::StorageError;

/// Source of archive bytes for the file service
pub trait ArchiveProvider: Send + Sync {
    fn get(&self, package: u8, archive: u16) -> Result<Vec<u8>, StorageError>;
}
