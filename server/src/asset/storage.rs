use std::collections::HashMap;

use log::info;
use parking_lot::Mutex;
use shared::{MANIFEST_PACKAGE, RELEASE_MANIFEST_ARCHIVE};

use super::archive::{compress_archive, trim_archive, Compression};
use super::cache::Cache;
use super::manifest::create_release_manifest;
use super::ArchiveProvider;
use crate::error::StorageError;

/// Memoizing front for [`Cache`]
///
/// Archives are trimmed to their container length the first time they are
/// read and served from memory afterwards. Callers always receive their own
/// copy of the bytes.
pub struct Storage {
    cache: Cache,
    archives: Mutex<HashMap<u8, HashMap<u16, Vec<u8>>>>,
}

impl Storage {
    /// Wraps `cache` and stores the release manifest at its reserved slot
    pub fn new(cache: Cache) -> Result<Self, StorageError> {
        let manifest = create_release_manifest(&cache)?;
        let packed = compress_archive(Compression::None, &manifest)?;

        info!(
            "Release manifest covers {} packages ({} bytes)",
            cache.package_count(),
            manifest.len()
        );

        let mut archives: HashMap<u8, HashMap<u16, Vec<u8>>> = HashMap::new();
        archives
            .entry(MANIFEST_PACKAGE)
            .or_default()
            .insert(RELEASE_MANIFEST_ARCHIVE, packed);

        Ok(Self {
            cache,
            archives: Mutex::new(archives),
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn get(&self, package: u8, archive: u16) -> Result<Vec<u8>, StorageError> {
        let mut archives = self.archives.lock();

        if let Some(bytes) = archives.get(&package).and_then(|memo| memo.get(&archive)) {
            return Ok(bytes.clone());
        }

        let stored = self.cache.get(package, archive)?;
        let trimmed = trim_archive(&stored)?.to_vec();

        archives
            .entry(package)
            .or_default()
            .insert(archive, trimmed.clone());
        Ok(trimmed)
    }
}

impl ArchiveProvider for Storage {
    fn get(&self, package: u8, archive: u16) -> Result<Vec<u8>, StorageError> {
        Storage::get(self, package, archive)
    }
}
