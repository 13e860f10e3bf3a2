//! Connection actor
//!
//! A [`Client`] owns one byte stream and runs three loops over it:
//! - input: socket -> input ring -> [`StreamDecoder`] -> inbox
//! - output: command queue -> output ring -> socket, one send per flush
//! - dispatch: inbox -> [`MailRouter`]
//!
//! The loops share nothing but queues and a close signal. Every handle to a
//! client is a cheap clone of the same connection.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::message::{StreamDecoder, StreamEncoder};
use shared::{Message, Readable, RingBuffer, RingError, Writable};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mail::{Mail, MailRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Inactive,
    Active,
    Closed,
}

/// Work queued for the output loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    Bytes(Vec<u8>),
    Message(Message),
    Flush,
    /// Ends the connection once everything queued before it is sent
    Close,
}

struct Shared {
    id: u64,
    addr: SocketAddr,
    output_capacity: usize,
    state: Mutex<Lifecycle>,
    commands: mpsc::Sender<OutputCommand>,
    quit: watch::Sender<bool>,
}

/// Handle to one connection
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.shared.id)
            .field("addr", &self.shared.addr)
            .finish()
    }
}

async fn quit_signal(quit: &mut watch::Receiver<bool>) {
    // A dropped sender also means the client is gone.
    let _ = quit.wait_for(|closed| *closed).await;
}

impl Client {
    fn new(
        id: u64,
        addr: SocketAddr,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<OutputCommand>) {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let (quit, _) = watch::channel(false);

        let client = Self {
            shared: Arc::new(Shared {
                id,
                addr,
                output_capacity: config.output_capacity,
                state: Mutex::new(Lifecycle::Inactive),
                commands,
                quit,
            }),
        };
        (client, receiver)
    }

    /// Activates a client over `stream` and spawns its input, output and dispatch loops
    pub fn connect<S>(
        id: u64,
        addr: SocketAddr,
        stream: S,
        config: &ClientConfig,
        router: Arc<MailRouter>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client, commands) = Self::new(id, addr, config);
        let (reader, writer) = tokio::io::split(stream);
        let (inbox, messages) = mpsc::channel(config.message_capacity.max(1));

        let input = InputLoop {
            ring: RingBuffer::new(config.input_capacity),
            decoder: StreamDecoder::new(router.registry(), config.input_capacity),
            inbox,
        };
        let output = OutputLoop {
            ring: RingBuffer::new(config.output_capacity),
            encoder: StreamEncoder::new(config.output_capacity),
            commands,
        };

        client.activate();

        tokio::spawn(input.run(client.clone(), reader));
        tokio::spawn(output.run(client.clone(), writer));
        tokio::spawn(dispatch(client.clone(), messages, router));

        client
    }

    /// An active client with no socket; the receiver sees everything the output loop would
    pub fn detached(
        id: u64,
        addr: SocketAddr,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<OutputCommand>) {
        let (client, commands) = Self::new(id, addr, config);
        client.activate();
        (client, commands)
    }

    fn activate(&self) {
        let mut state = self.shared.state.lock();
        if *state == Lifecycle::Inactive {
            *state = Lifecycle::Active;
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.shared.addr
    }

    pub fn is_active(&self) -> bool {
        *self.shared.state.lock() == Lifecycle::Active
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.state.lock() == Lifecycle::Closed
    }

    fn check(&self) -> Result<(), ClientError> {
        match *self.shared.state.lock() {
            Lifecycle::Inactive => Err(ClientError::NotActive),
            Lifecycle::Active => Ok(()),
            Lifecycle::Closed => Err(ClientError::Closed),
        }
    }

    async fn command(&self, command: OutputCommand) -> Result<(), ClientError> {
        self.check()?;
        self.shared
            .commands
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Queues raw bytes for the output buffer
    pub async fn write(&self, bytes: Vec<u8>) -> Result<(), ClientError> {
        self.command(OutputCommand::Bytes(bytes)).await
    }

    /// Queues a message for encoding into the output buffer
    pub async fn send(&self, message: Message) -> Result<(), ClientError> {
        self.command(OutputCommand::Message(message)).await
    }

    /// Queues a send of everything buffered so far
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.command(OutputCommand::Flush).await
    }

    pub async fn send_now(&self, message: Message) -> Result<(), ClientError> {
        self.send(message).await?;
        self.flush().await
    }

    /// Sends `message` as the last thing on this connection, then closes it
    pub async fn send_and_close(&self, message: Message) -> Result<(), ClientError> {
        self.send_now(message).await?;
        self.command(OutputCommand::Close).await
    }

    pub fn writer(&self) -> FlushWriter<'_> {
        FlushWriter {
            client: self,
            counter: 0,
        }
    }

    /// Returns false if the client was already closed
    pub fn close(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if *state == Lifecycle::Closed {
                return false;
            }
            *state = Lifecycle::Closed;
        }

        self.shared.quit.send_replace(true);
        info!("Client {} ({}) closed", self.shared.id, self.shared.addr);
        true
    }

    /// Logs `err` and closes the client
    pub fn fatal(&self, err: impl fmt::Display) {
        warn!(
            "Client {} ({}) fatal error: {}",
            self.shared.id, self.shared.addr, err
        );
        self.close();
    }

    /// Resolves once the client is closed
    pub async fn closed(&self) {
        let mut quit = self.shared.quit.subscribe();
        quit_signal(&mut quit).await;
    }
}

/// Writes through a client, flushing before its output buffer would fill
pub struct FlushWriter<'a> {
    client: &'a Client,
    counter: usize,
}

impl FlushWriter<'_> {
    /// Writes `bytes`, in pieces no larger than the output buffer
    pub async fn write(&mut self, bytes: Vec<u8>) -> Result<(), ClientError> {
        let capacity = self.client.shared.output_capacity.max(1);
        if bytes.len() <= capacity {
            return self.write_piece(bytes, capacity).await;
        }
        for piece in bytes.chunks(capacity) {
            self.write_piece(piece.to_vec(), capacity).await?;
        }
        Ok(())
    }

    async fn write_piece(&mut self, bytes: Vec<u8>, capacity: usize) -> Result<(), ClientError> {
        if self.counter > 0 && self.counter + bytes.len() >= capacity {
            self.client.flush().await?;
            self.counter = 0;
        }
        self.counter += bytes.len();
        self.client.write(bytes).await
    }
}

struct InputLoop {
    ring: RingBuffer,
    decoder: StreamDecoder,
    inbox: mpsc::Sender<Message>,
}

impl InputLoop {
    async fn run<R: AsyncRead + Unpin>(self, client: Client, reader: R) {
        match self.process(&client, reader).await {
            Ok(()) => {
                client.close();
            }
            Err(err) => client.fatal(err),
        }
    }

    async fn process<R: AsyncRead + Unpin>(
        mut self,
        client: &Client,
        mut reader: R,
    ) -> Result<(), ClientError> {
        let mut quit = client.shared.quit.subscribe();
        let mut transfer = vec![0u8; self.ring.capacity()];

        loop {
            let writable = self.ring.writable();
            if writable == 0 {
                return Err(ClientError::InputOverflow(RingError::ShortWrite {
                    written: 0,
                    requested: 1,
                }));
            }

            let read = tokio::select! {
                _ = quit_signal(&mut quit) => return Ok(()),
                read = reader.read(&mut transfer[..writable]) => read?,
            };

            if read == 0 {
                debug!("Client {} reached end of stream", client.id());
                return Ok(());
            }

            self.ring
                .write(&transfer[..read])
                .map_err(ClientError::InputOverflow)?;

            while let Some(message) = self.decoder.decode(&mut self.ring)? {
                self.inbox.try_send(message).map_err(|err| match err {
                    TrySendError::Full(_) => ClientError::InboxFull,
                    TrySendError::Closed(_) => ClientError::Closed,
                })?;
            }
        }
    }
}

struct OutputLoop {
    ring: RingBuffer,
    encoder: StreamEncoder,
    commands: mpsc::Receiver<OutputCommand>,
}

impl OutputLoop {
    async fn run<W: AsyncWrite + Unpin>(self, client: Client, writer: W) {
        if let Err(err) = self.process(&client, writer).await {
            client.fatal(err);
        }
    }

    async fn process<W: AsyncWrite + Unpin>(
        mut self,
        client: &Client,
        mut writer: W,
    ) -> Result<(), ClientError> {
        let mut quit = client.shared.quit.subscribe();
        let mut pending = vec![0u8; self.ring.capacity()];

        loop {
            let command = tokio::select! {
                _ = quit_signal(&mut quit) => return Ok(()),
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => return Ok(()),
                },
            };

            match command {
                OutputCommand::Bytes(bytes) => {
                    self.ring
                        .write(&bytes)
                        .map_err(ClientError::OutputOverflow)?;
                }
                OutputCommand::Message(message) => {
                    self.encoder.encode(&message, &mut self.ring)?;
                }
                OutputCommand::Flush => {
                    if self.ring.is_empty() {
                        continue;
                    }
                    let length = self
                        .ring
                        .read(&mut pending)
                        .map_err(ClientError::OutputOverflow)?;

                    tokio::select! {
                        _ = quit_signal(&mut quit) => return Ok(()),
                        sent = send(&mut writer, &pending[..length]) => sent?,
                    }
                }
                OutputCommand::Close => {
                    let _ = writer.shutdown().await;
                    client.close();
                    return Ok(());
                }
            }
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn dispatch(client: Client, mut messages: mpsc::Receiver<Message>, router: Arc<MailRouter>) {
    let mut quit = client.shared.quit.subscribe();

    loop {
        let message = tokio::select! {
            _ = quit_signal(&mut quit) => break,
            message = messages.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let mail = Mail {
            source: client.clone(),
            message,
        };
        if let Err(err) = router.publish(mail).await {
            client.fatal(err);
            break;
        }
    }
}
