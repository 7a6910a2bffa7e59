use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;

use flock_core::player::{Avatar, is_valid_display_name};

/// Identifies one live WebSocket connection for its lifetime.
pub type ConnectionId = u64;

/// Per-connection sender for outbound binary messages.
/// Bounded to prevent memory exhaustion from slow clients.
/// Uses `Bytes` for zero-copy cloning when broadcasting.
pub type ClientSender = mpsc::Sender<Bytes>;

/// Where a connection currently lives. The lobby is a sentinel location, not
/// a room; a connection is never left pointing at a removed room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Lobby,
    Room(String),
}

#[derive(Debug)]
pub enum RegistryError {
    NameTaken(String),
    InvalidName,
    InvalidAvatar,
    UnknownConnection(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameTaken(name) => write!(f, "name already in use: {name}"),
            Self::InvalidName => write!(f, "invalid display name"),
            Self::InvalidAvatar => write!(f, "invalid avatar selection"),
            Self::UnknownConnection(id) => write!(f, "unknown connection: {id}"),
        }
    }
}

impl std::error::Error for RegistryError {}

struct Connection {
    name: Option<String>,
    avatar: Avatar,
    location: Location,
    sender: ClientSender,
}

/// Tracks every live connection, its registered display name, and its current
/// location. Single writer: only the lobby coordinator mutates it.
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// Reverse index: registered name -> holding connection.
    names: HashMap<String, ConnectionId>,
    next_id: ConnectionId,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            names: HashMap::new(),
            next_id: 1,
        }
    }

    /// Track a freshly accepted connection. It holds no name and receives no
    /// broadcasts until it registers.
    pub fn connect(&mut self, sender: ClientSender) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection {
                name: None,
                avatar: Avatar::default(),
                location: Location::Lobby,
                sender,
            },
        );
        id
    }

    /// Register a display name for a connection. The name must be unique among
    /// all currently connected names, lobby-wide.
    pub fn register(
        &mut self,
        id: ConnectionId,
        name: &str,
        avatar: Avatar,
    ) -> Result<(), RegistryError> {
        if !is_valid_display_name(name) {
            return Err(RegistryError::InvalidName);
        }
        // Re-validate the index even though serde produced the value; the wire
        // carries a bare byte.
        if Avatar::new(avatar.index()).is_none() {
            return Err(RegistryError::InvalidAvatar);
        }
        let name = name.trim();
        if let Some(&holder) = self.names.get(name)
            && holder != id
        {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        if let Some(old) = conn.name.take() {
            self.names.remove(&old);
        }
        conn.name = Some(name.to_string());
        conn.avatar = avatar;
        conn.location = Location::Lobby;
        self.names.insert(name.to_string(), id);
        Ok(())
    }

    /// Remove all trace of a connection, releasing its name reservation.
    /// Returns the registered name and last location for cleanup broadcasts.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<(Option<String>, Location)> {
        let conn = self.connections.remove(&id)?;
        if let Some(ref name) = conn.name {
            self.names.remove(name);
        }
        Some((conn.name, conn.location))
    }

    pub fn lookup_name(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id)?.name.as_deref()
    }

    pub fn avatar(&self, id: ConnectionId) -> Option<Avatar> {
        self.connections.get(&id).map(|c| c.avatar)
    }

    pub fn location(&self, id: ConnectionId) -> Option<&Location> {
        self.connections.get(&id).map(|c| &c.location)
    }

    pub fn set_location(&mut self, id: ConnectionId, location: Location) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.location = location;
        }
    }

    /// Registered display names currently in the lobby, in name order.
    pub fn lobby_roster(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.location == Location::Lobby)
            .filter_map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Send raw bytes to one connection.
    pub fn send_to(&self, id: ConnectionId, data: Bytes) {
        if let Some(conn) = self.connections.get(&id)
            && let Err(e) = conn.sender.try_send(data)
        {
            tracing::debug!(connection = id, error = %e, "Failed to send (slow or disconnected)");
        }
    }

    /// Broadcast raw bytes to every registered lobby member, optionally
    /// excluding one connection.
    pub fn broadcast_lobby(&self, data: &[u8], except: Option<ConnectionId>) {
        let bytes = Bytes::copy_from_slice(data);
        for (&id, conn) in &self.connections {
            if Some(id) == except || conn.name.is_none() || conn.location != Location::Lobby {
                continue;
            }
            if let Err(e) = conn.sender.try_send(bytes.clone()) {
                tracing::debug!(connection = id, error = %e, "Skipping lobby broadcast to slow client");
            }
        }
    }

    /// Broadcast raw bytes to a set of connections, optionally excluding one.
    pub fn broadcast_to(&self, ids: &[ConnectionId], data: &[u8], except: Option<ConnectionId>) {
        let bytes = Bytes::copy_from_slice(data);
        for &id in ids {
            if Some(id) == except {
                continue;
            }
            if let Some(conn) = self.connections.get(&id)
                && let Err(e) = conn.sender.try_send(bytes.clone())
            {
                tracing::debug!(connection = id, error = %e, "Skipping broadcast to slow client");
            }
        }
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
