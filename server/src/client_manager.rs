//! Connection bookkeeping for the demo host
//!
//! Maps UDP peers to session ids, tracks liveness, and enforces capacity.
//! Session ids are random so they cannot collide across reconnects.

use log::info;
use shared::SessionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected UDP peer
#[derive(Debug)]
pub struct Client {
    pub id: SessionId,
    pub addr: SocketAddr,
    pub display_name: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: SessionId, addr: SocketAddr, display_name: &str) -> Self {
        Self {
            id,
            addr,
            display_name: display_name.to_string(),
            last_seen: Instant::now(),
        }
    }

    /// Checks if the client has been silent longer than `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All connected clients, keyed by session id
pub struct ClientManager {
    clients: HashMap<SessionId, Client>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates a manager that accepts up to `max_clients` sessions
    /// and drops them after the default silence timeout.
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, CLIENT_TIMEOUT)
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Registers a peer. Returns `None` when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr, display_name: &str) -> Option<SessionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let mut id = SessionId(rand::random());
        while self.clients.contains_key(&id) {
            id = SessionId(rand::random());
        }

        info!("Client {} ({}) connected from {}", id, display_name, addr);
        self.clients.insert(id, Client::new(id, addr, display_name));
        Some(id)
    }

    /// Removes a session and returns its client record.
    pub fn remove_client(&mut self, id: SessionId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds the session bound to a network address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Network address of a session, for outbound packets.
    pub fn addr_of(&self, id: SessionId) -> Option<SocketAddr> {
        self.clients.get(&id).map(|client| client.addr)
    }

    /// Marks the client as alive. Returns false for unknown ids.
    pub fn touch(&mut self, id: SessionId) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Ids of clients silent for longer than the timeout. They stay registered;
    /// the caller decides whether the termination goes through.
    pub fn check_timeouts(&self) -> Vec<SessionId> {
        self.clients
            .values()
            .filter(|client| client.is_timed_out(self.timeout))
            .map(|client| client.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
