use clap::Parser;
use server::asset::decompress_archive;
use server::file::ResponseAssembler;
use shared::message::{status_descriptors, StreamDecoder, StreamEncoder};
use shared::{Message, Registry, Request, RingBuffer, Status, Writable};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Fetches one archive from a running server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1:43594")]
    address: String,
    /// Protocol version sent in the handshake
    #[clap(short, long, default_value = "177")]
    version: u32,
    /// Package id
    #[clap(short, long)]
    package: u8,
    /// Archive id
    #[clap(short, long)]
    archive: u16,
    /// Send the request as passive instead of priority
    #[clap(long)]
    passive: bool,
    /// Unpack the archive container before writing it out
    #[clap(short, long)]
    decompress: bool,
    /// Output file; defaults to stdout
    #[clap(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut stream = TcpStream::connect(&args.address).await?;
    eprintln!("Connected to {}", stream.peer_addr()?);

    let mut encoder = StreamEncoder::new(64);
    let handshake = encoder.encode_to_vec(&Message::FileHandshake {
        version: args.version,
    })?;
    stream.write_all(&handshake).await?;

    // The reply is a single framed status message; read it a byte at a time.
    let registry = Arc::new(Registry::new(status_descriptors())?);
    let mut decoder = StreamDecoder::new(registry, 1024);
    let mut ring = RingBuffer::new(1024);
    let mut buffer = [0u8; 1024];

    let reply = loop {
        if let Some(message) = decoder.decode(&mut ring)? {
            break message;
        }
        let read = stream.read(&mut buffer[..1]).await?;
        if read == 0 {
            return Err("connection closed before handshake reply".into());
        }
        ring.write(&buffer[..read])?;
    };

    match reply {
        Message::Status(Status::Okay) => eprintln!("Handshake accepted"),
        other => return Err(format!("handshake rejected: {:?}", other).into()),
    }

    let request = Request::new(args.package, args.archive);
    let message = if args.passive {
        Message::PassiveRequest(request)
    } else {
        Message::PriorityRequest(request)
    };
    stream.write_all(&encoder.encode_to_vec(&message)?).await?;

    let mut assembler = ResponseAssembler::new();
    let response = loop {
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            return Err("connection closed mid-response".into());
        }
        if let (_, Some(response)) = assembler.push(&buffer[..read])? {
            break response;
        }
    };

    eprintln!(
        "Received archive {}/{} ({} bytes)",
        response.package,
        response.archive,
        response.data.len()
    );

    let bytes = if args.decompress {
        decompress_archive(&response.data)?
    } else {
        response.data
    };

    match args.output {
        Some(path) => tokio::fs::write(path, bytes).await?,
        None => tokio::io::stdout().write_all(&bytes).await?,
    }

    Ok(())
}
