use clap::Parser;
use log::{error, info};
use server::asset::{Cache, Storage};
use server::config::ServerConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Main-method of the application.
/// Loads configuration, opens the cache and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// JSON configuration file; unset fields keep their defaults
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Server IP address to bind to
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// Server port to listen on
        #[clap(short, long)]
        port: Option<u16>,
        /// Directory holding the cache files
        #[clap(long)]
        cache: Option<PathBuf>,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(cache) = args.cache {
        config.cache.path = cache;
    }

    let cache = Cache::open(&config.cache.path, config.cache.package_count)?;
    let storage = Arc::new(Storage::new(cache)?);
    info!("Loaded cache from {:?}", config.cache.path);

    let server = server::bind(&config, storage).await?;

    // Handle shutdown gracefully
    tokio::select! {
        _ = server.run() => {
            error!("Server stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
