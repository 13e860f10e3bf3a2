//! In-memory archive providers for file service tests

use std::collections::HashMap;

use crate::asset::ArchiveProvider;
use crate::error::StorageError;

#[derive(Default)]
pub struct MemoryProvider {
    archives: HashMap<(u8, u16), Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, package: u8, archive: u16, bytes: Vec<u8>) -> Self {
        self.archives.insert((package, archive), bytes);
        self
    }
}

impl ArchiveProvider for MemoryProvider {
    fn get(&self, package: u8, archive: u16) -> Result<Vec<u8>, StorageError> {
        self.archives
            .get(&(package, archive))
            .cloned()
            .ok_or(StorageError::ArchiveNotFound { package, archive })
    }
}

pub fn archive_bytes(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i % 251) as u8).collect()
}
