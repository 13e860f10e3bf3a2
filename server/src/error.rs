//! Error types for storage, connections and the file service

use std::io;

use shared::{CursorError, ProtocolError, RingError};
use thiserror::Error;
use tokio::task::JoinError;

use crate::asset::BlockHeader;

/// Failures reading archives out of the cache or unpacking them
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache does not contain package {0}")]
    MissingIndex(u8),

    #[error("archive {package}/{archive} does not exist")]
    ArchiveNotFound { package: u8, archive: u16 },

    #[error("block {block} lies beyond the end of the block file")]
    UnexpectedEof { block: u32 },

    #[error("premature end of archive {package}/{archive}: chain ended after {read} of {length} bytes")]
    PrematureEnd {
        package: u8,
        archive: u16,
        read: usize,
        length: usize,
    },

    #[error("invalid block header at block {block}: expected {expected:?}, found {found:?}")]
    InvalidBlockHeader {
        block: u32,
        expected: BlockHeader,
        found: BlockHeader,
    },

    #[error("unsupported compression {0}")]
    UnsupportedCompression(u8),

    #[error("unsupported manifest format {0}")]
    UnsupportedManifestFormat(u8),

    #[error("archive truncated: container needs {needed} bytes, found {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("archive decompressed to {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Failures of one client connection; every variant is fatal to that client only
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("client is not active")]
    NotActive,

    #[error("client is closed")]
    Closed,

    #[error("input buffer overflow: {0}")]
    InputOverflow(RingError),

    #[error("message inbox is full")]
    InboxFull,

    #[error("output buffer overflow: {0}")]
    OutputOverflow(RingError),

    #[error("no handler is accepting message {0}")]
    Undeliverable(u8),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failures loading the server configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures inside the file-serving pipeline
#[derive(Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("received request from client without an active session")]
    NoSession,

    #[error("client sent a second handshake")]
    DuplicateHandshake,

    #[error("no worker is left to serve requests")]
    NoWorkers,

    #[error("{0} request queue is full")]
    QueueFull(&'static str),

    #[error("expected chunk separator, found {0:#04x}")]
    MissingSeparator(u8),

    #[error("worker task failed: {0}")]
    Worker(#[from] JoinError),
}
