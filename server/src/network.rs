//! Server network layer accepting TCP connections and tracking live clients

use crate::client::Client;
use crate::client_manager::ClientManager;
use crate::config::ClientConfig;
use crate::mail::MailRouter;
use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages sent from connection tasks to the accept loop
#[derive(Debug)]
pub enum ServerMessage {
    ClientClosed { client_id: u64 },
}

/// Accepts connections and hands each one to a [`Client`]
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    client_config: ClientConfig,
    router: Arc<MailRouter>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        max_clients: usize,
        client_config: ClientConfig,
        router: Arc<MailRouter>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: ClientManager::new(max_clients),
            client_config,
            router,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop forever
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.handle_connection(stream, addr),
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(message) = self.server_rx.recv() => self.handle_message(message),
            }
        }
    }

    fn handle_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let config = &self.client_config;
        let router = &self.router;
        let server_tx = self.server_tx.clone();

        let added = self.clients.add_client(|client_id| {
            let client = Client::connect(client_id, addr, stream, config, Arc::clone(router));

            let watched = client.clone();
            tokio::spawn(async move {
                watched.closed().await;
                let _ = server_tx.send(ServerMessage::ClientClosed {
                    client_id: watched.id(),
                });
            });

            client
        });

        if added.is_none() {
            // Dropping the stream refuses the connection.
            warn!("Refusing connection from {}: server full", addr);
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ClientClosed { client_id } => {
                self.clients.remove_client(&client_id);
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.clients.close_all();
    }
}
