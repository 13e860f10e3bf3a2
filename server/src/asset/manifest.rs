//! Release manifest synthesis

use log::debug;
use shared::{ByteCursor, MANIFEST_PACKAGE};

use super::archive::decompress_archive;
use super::cache::Cache;
use crate::error::StorageError;

pub const MINIMUM_FORMAT: u8 = 5;
pub const MAXIMUM_FORMAT: u8 = 6;

/// Bytes per package in the release manifest: crc32 then version
pub const ENTRY_LENGTH: usize = 8;

/// Format byte and version of a package manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestHeader {
    pub format: u8,
    pub version: u32,
}

impl ManifestHeader {
    /// Reads the header of an unpacked package manifest; versions start at format 6
    pub fn parse(bytes: &[u8]) -> Result<Self, StorageError> {
        let mut cursor = ByteCursor::new(bytes);
        let format = cursor.get_u8()?;
        if !(MINIMUM_FORMAT..=MAXIMUM_FORMAT).contains(&format) {
            return Err(StorageError::UnsupportedManifestFormat(format));
        }

        let version = if format > MINIMUM_FORMAT {
            cursor.get_u32()?
        } else {
            0
        };
        Ok(Self { format, version })
    }
}

/// Builds the `(crc32, version)` table clients compare their local cache against
///
/// The checksum covers each package manifest exactly as stored, before
/// trimming or decompression.
pub fn create_release_manifest(cache: &Cache) -> Result<Vec<u8>, StorageError> {
    let mut manifest = ByteCursor::with_length(cache.package_count() * ENTRY_LENGTH);

    for package in 0..cache.package_count() {
        let stored = cache.get(MANIFEST_PACKAGE, package as u16)?;
        let header = ManifestHeader::parse(&decompress_archive(&stored)?)?;

        manifest.put_u32(crc32fast::hash(&stored))?;
        manifest.put_u32(header.version)?;

        debug!(
            "Package {} manifest format {} version {}",
            package, header.format, header.version
        );
    }

    Ok(manifest.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::archive::{compress_archive, Compression};
    use crate::asset::testing::CacheBuilder;

    fn package_manifest(format: u8, version: u32) -> Vec<u8> {
        let mut bytes = vec![format];
        if format >= 6 {
            bytes.extend_from_slice(&version.to_be_bytes());
        }
        // flags and an empty group table
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes
    }

    #[test]
    fn test_three_packages_in_ascending_order() {
        let mut builder = CacheBuilder::new(3);
        let mut stored = Vec::new();
        for (package, version) in [1u32, 2, 3].into_iter().enumerate() {
            let archive = compress_archive(Compression::Gzip, &package_manifest(6, version)).unwrap();
            builder = builder.archive(MANIFEST_PACKAGE, package as u16, &archive);
            stored.push(archive);
        }
        let cache = builder.build();

        let manifest = create_release_manifest(&cache).unwrap();
        assert_eq!(manifest.len(), 24);

        let mut cursor = ByteCursor::new(&manifest[..]);
        for (archive, version) in stored.iter().zip([1u32, 2, 3]) {
            assert_eq!(cursor.get_u32().unwrap(), crc32fast::hash(archive));
            assert_eq!(cursor.get_u32().unwrap(), version);
        }
    }

    #[test]
    fn test_format_five_has_no_version() {
        let archive = compress_archive(Compression::None, &package_manifest(5, 0)).unwrap();
        let cache = CacheBuilder::new(1)
            .archive(MANIFEST_PACKAGE, 0, &archive)
            .build();

        let manifest = create_release_manifest(&cache).unwrap();
        assert_eq!(&manifest[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_unsupported_format() {
        for format in [4u8, 7] {
            let archive = compress_archive(Compression::None, &[format, 0, 0, 0, 1]).unwrap();
            let cache = CacheBuilder::new(1)
                .archive(MANIFEST_PACKAGE, 0, &archive)
                .build();

            assert!(matches!(
                create_release_manifest(&cache),
                Err(StorageError::UnsupportedManifestFormat(f)) if f == format
            ));
        }
    }

    #[test]
    fn test_missing_package_manifest() {
        let cache = CacheBuilder::new(2)
            .archive(
                MANIFEST_PACKAGE,
                0,
                &compress_archive(Compression::None, &package_manifest(6, 1)).unwrap(),
            )
            .build();
        assert!(matches!(
            create_release_manifest(&cache),
            Err(StorageError::ArchiveNotFound { archive: 1, .. })
        ));
    }
}
