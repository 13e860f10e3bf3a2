//! Synthetic on-disk caches for tests

use std::collections::HashMap;
use std::fs;
use std::ops::Deref;
use std::path::Path;

use shared::MANIFEST_PACKAGE;
use tempfile::TempDir;

use super::cache::{
    index_file_name, BlockHeader, Cache, BLOCKS_FILE_NAME, BLOCK_HEADER_LENGTH, BLOCK_LENGTH,
    BLOCK_PAYLOAD_LENGTH, END_OF_ARCHIVE, INDEX_RECORD_LENGTH,
};

/// Lays archives out as block chains, one fresh block per chunk
pub struct CacheBuilder {
    package_count: usize,
    blocks: Vec<[u8; BLOCK_LENGTH]>,
    indexes: HashMap<u8, Vec<u8>>,
    chains: HashMap<(u8, u16), Vec<u32>>,
}

/// A cache whose files live in a temporary directory for as long as it does
pub struct TestCache {
    cache: Cache,
    _dir: TempDir,
}

impl Deref for TestCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.cache
    }
}

impl CacheBuilder {
    pub fn new(package_count: usize) -> Self {
        Self {
            package_count,
            // Block 0 terminates chains and never holds data.
            blocks: vec![[0; BLOCK_LENGTH]],
            indexes: HashMap::new(),
            chains: HashMap::new(),
        }
    }

    pub fn archive(mut self, package: u8, archive: u16, data: &[u8]) -> Self {
        let first = self.blocks.len() as u32;
        let chunks: Vec<&[u8]> = data.chunks(BLOCK_PAYLOAD_LENGTH).collect();
        let mut chain = Vec::with_capacity(chunks.len());

        for (chunk, payload) in chunks.iter().enumerate() {
            let block = first + chunk as u32;
            let next_block = if chunk + 1 < chunks.len() {
                block + 1
            } else {
                END_OF_ARCHIVE
            };

            let header = BlockHeader {
                archive,
                chunk: chunk as u16,
                next_block,
                package,
            };

            let mut bytes = [0u8; BLOCK_LENGTH];
            bytes[..BLOCK_HEADER_LENGTH].copy_from_slice(&header.to_bytes());
            bytes[BLOCK_HEADER_LENGTH..BLOCK_HEADER_LENGTH + payload.len()].copy_from_slice(payload);
            self.blocks.push(bytes);
            chain.push(block);
        }

        let start_block = if data.is_empty() { END_OF_ARCHIVE } else { first };
        let index = self.indexes.entry(package).or_default();
        let position = archive as usize * INDEX_RECORD_LENGTH;
        if index.len() < position + INDEX_RECORD_LENGTH {
            index.resize(position + INDEX_RECORD_LENGTH, 0);
        }
        let length = (data.len() as u32).to_be_bytes();
        let start = start_block.to_be_bytes();
        index[position..position + INDEX_RECORD_LENGTH]
            .copy_from_slice(&[length[1], length[2], length[3], start[1], start[2], start[3]]);

        self.chains.insert((package, archive), chain);
        self
    }

    /// Rewrites the header of the `chunk`th block of an archive's chain
    pub fn corrupt_block(
        &mut self,
        package: u8,
        archive: u16,
        chunk: usize,
        corrupt: impl FnOnce(&mut BlockHeader),
    ) {
        let block = self.chains[&(package, archive)][chunk] as usize;
        let mut header_bytes = [0u8; BLOCK_HEADER_LENGTH];
        header_bytes.copy_from_slice(&self.blocks[block][..BLOCK_HEADER_LENGTH]);

        let mut header = BlockHeader::parse(&header_bytes);
        corrupt(&mut header);
        self.blocks[block][..BLOCK_HEADER_LENGTH].copy_from_slice(&header.to_bytes());
    }

    /// Writes the cache files into `root` and opens them
    pub fn build_at(&self, root: &Path) -> Cache {
        let blocks: Vec<u8> = self.blocks.iter().flatten().copied().collect();
        fs::write(root.join(BLOCKS_FILE_NAME), blocks).unwrap();

        let packages = (0..self.package_count as u8).chain(std::iter::once(MANIFEST_PACKAGE));
        for package in packages {
            let index = self.indexes.get(&package).cloned().unwrap_or_default();
            fs::write(root.join(index_file_name(package)), index).unwrap();
        }

        Cache::open(root, self.package_count).unwrap()
    }

    pub fn build(self) -> TestCache {
        let dir = tempfile::tempdir().unwrap();
        let cache = self.build_at(dir.path());
        TestCache { cache, _dir: dir }
    }
}
