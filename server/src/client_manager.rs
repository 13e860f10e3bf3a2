//! Table of live connections for the accept loop
//!
//! This module tracks every connected [`Client`], including:
//! - Client id allocation for new connections
//! - Capacity enforcement at accept time
//! - Removal once a connection closes
//!
//! The table is owned by the accept loop alone, so it needs no locking.

use log::info;
use std::collections::HashMap;

use crate::client::Client;

/// Manages all live connections
///
/// The ClientManager hands out unique client ids, refuses new connections
/// once the configured capacity is reached, and keeps a handle to each
/// client so the server can close them all on shutdown.
pub struct ClientManager {
    /// Live connections keyed by client id
    clients: HashMap<u64, Client>,
    /// Id handed to the next accepted connection
    next_client_id: u64,
    /// Connection limit, from `client_capacity`
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty table that admits at most `max_clients` connections
    ///
    /// Ids start at 1 and are never reused, even after a client leaves.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity. `connect` receives the allocated id and builds the client;
    /// it is not called at all when the connection is refused.
    pub fn add_client<F>(&mut self, connect: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Client,
    {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = connect(client_id);
        info!("Client {} connected from {}", client_id, client.remote_addr());
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the table
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone.
    pub fn remove_client(&mut self, client_id: &u64) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id());
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: &u64) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Closes every connection and empties the table
    pub fn close_all(&mut self) {
        for (_, client) in self.clients.drain() {
            client.close();
        }
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
