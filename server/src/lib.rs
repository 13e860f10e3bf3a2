//! # Archive Server Library
//!
//! This library serves versioned binary archives out of a block-chained
//! on-disk cache to many simultaneously connected clients over a compact
//! framed binary protocol.
//!
//! ## Core Responsibilities
//!
//! ### Archive Storage
//! Archives live in one shared block file, chained 520-byte block by block,
//! with one index file per package. The [`asset::Cache`] walks these chains
//! and rejects any block whose header does not belong to the archive being
//! read. [`asset::Storage`] memoizes trimmed archives and synthesizes the
//! release manifest once at startup.
//!
//! ### Connections
//! Every TCP connection becomes a [`client::Client`], an actor running an
//! input loop, an output loop and a dispatch loop. Decoded messages travel
//! through the [`mail::MailRouter`] to the one service that accepts them.
//!
//! ### File Serving
//! The [`file::FileService`] admits clients through a versioned handshake,
//! gives each one a session with a priority and a passive request queue, and
//! streams archives back through a fixed pool of workers. Each session has at
//! most one archive in flight, since responses carry no request id.
//!
//! ## Module Organization
//!
//! - `asset`: cache, archive containers, release manifest, storage
//! - `client`: the connection actor and its buffered writer
//! - `client_manager`: table of live connections
//! - `config`: JSON configuration with defaults
//! - `error`: error types for every layer
//! - `file`: file service, sessions, workers, response reassembly
//! - `mail`: message routing
//! - `network`: the TCP accept loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::asset::{Cache, Storage};
//! use server::config::ServerConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let cache = Cache::open(&config.cache.path, config.cache.package_count)?;
//!     let storage = Arc::new(Storage::new(cache)?);
//!
//!     let server = server::bind(&config, storage).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod asset;
pub mod client;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod file;
pub mod mail;
pub mod network;

use std::sync::Arc;

use asset::ArchiveProvider;
use config::ServerConfig;
use file::FileService;
use mail::MailRouter;
use network::Server;

/// Starts the file service over `provider` and binds a server routing to it
pub async fn bind(
    config: &ServerConfig,
    provider: Arc<dyn ArchiveProvider>,
) -> Result<Server, Box<dyn std::error::Error>> {
    let file_service = FileService::start(config.file.clone(), provider);
    let router = Arc::new(MailRouter::new(vec![file_service])?);

    let server = Server::bind(
        &config.address(),
        config.client_capacity,
        config.client.clone(),
        router,
    )
    .await?;
    Ok(server)
}
