use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use flock_core::net::messages::{
    GamePortMsg, LobbyChatBroadcastMsg, MemberMsg, RegisterResponseMsg, RoomJoinDeniedMsg,
    RoomListMsg, RosterMsg, ServerMessage,
};
use flock_core::net::protocol::encode_server_message;
use flock_core::player::Avatar;

use crate::launcher::SessionLauncher;
use crate::registry::{ClientSender, ConnectionId, ConnectionRegistry, Location};
use crate::rooms::{JoinOutcome, ReadyOutcome, RoomCoordinator};

pub type SharedLobby = Arc<RwLock<LobbyCoordinator>>;

/// Maximum length of a room name in characters.
const MAX_ROOM_NAME_LEN: usize = 64;

/// A full-ready room's frozen roster, handed to the session launch cycle.
/// Join order is authoritative: index 0 becomes the boss.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub room: String,
    pub participants: Vec<String>,
    pub avatars: Vec<Avatar>,
}

/// Owns the connection registry and room table and performs every broadcast.
/// All mutation happens under one writer lock, so membership updates are
/// atomic with respect to each other.
pub struct LobbyCoordinator {
    registry: ConnectionRegistry,
    rooms: RoomCoordinator,
    launcher: SessionLauncher,
    chat_max_len: usize,
}

impl LobbyCoordinator {
    pub fn new(launcher: SessionLauncher, chat_max_len: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomCoordinator::new(),
            launcher,
            chat_max_len,
        }
    }

    pub fn launcher(&self) -> SessionLauncher {
        self.launcher.clone()
    }

    /// Track a freshly accepted connection.
    pub fn connect(&mut self, sender: ClientSender) -> ConnectionId {
        self.registry.connect(sender)
    }

    /// Handle a name registration request. Failure is reported to the
    /// requester alone; nothing else changes.
    pub fn register(&mut self, id: ConnectionId, username: &str, avatar: Avatar) {
        match self.registry.register(id, username, avatar) {
            Ok(()) => {
                let name = self
                    .registry
                    .lookup_name(id)
                    .unwrap_or_default()
                    .to_string();
                self.send_msg(
                    id,
                    &ServerMessage::RegisterResponse(RegisterResponseMsg {
                        accepted: true,
                        username: Some(name.clone()),
                        error: None,
                    }),
                );
                self.send_msg(
                    id,
                    &ServerMessage::LobbyMembers(RosterMsg {
                        names: self.registry.lobby_roster(),
                    }),
                );
                self.broadcast_lobby_msg(
                    &ServerMessage::LobbyMemberJoined(MemberMsg { name: name.clone() }),
                    Some(id),
                );
                tracing::info!(connection = id, name = %name, "Player registered");
            },
            Err(e) => {
                tracing::debug!(connection = id, error = %e, "Registration rejected");
                self.send_msg(
                    id,
                    &ServerMessage::RegisterResponse(RegisterResponseMsg {
                        accepted: false,
                        username: None,
                        error: Some(e.to_string()),
                    }),
                );
            },
        }
    }

    /// Send the current open-room list to one requester.
    pub fn request_rooms(&self, id: ConnectionId) {
        self.send_msg(
            id,
            &ServerMessage::RoomList(RoomListMsg {
                rooms: self.rooms.open_rooms(),
            }),
        );
    }

    /// Relay a chat line to every lobby member, the sender included.
    pub fn chat(&self, id: ConnectionId, text: &str) {
        let Some(sender) = self.registry.lookup_name(id) else {
            tracing::debug!(connection = id, "Chat from unregistered connection dropped");
            return;
        };
        if self.registry.location(id) != Some(&Location::Lobby) {
            tracing::debug!(connection = id, "Chat from outside the lobby dropped");
            return;
        }
        if text.len() > self.chat_max_len || text.chars().any(|c| c.is_control() && c != '\n') {
            tracing::debug!(connection = id, "Malformed chat message dropped");
            return;
        }
        self.broadcast_lobby_msg(
            &ServerMessage::LobbyChatBroadcast(LobbyChatBroadcastMsg {
                sender: sender.to_string(),
                text: text.to_string(),
            }),
            None,
        );
    }

    /// Move a connection into a room, creating it on first use. Joins to a
    /// room past its first ready vote are rejected back to the requester.
    pub fn join_room(&mut self, id: ConnectionId, room_name: &str) {
        let Some(name) = self.registry.lookup_name(id).map(String::from) else {
            tracing::debug!(connection = id, "Join from unregistered connection dropped");
            return;
        };
        let room_name = room_name.trim();
        if room_name.is_empty()
            || room_name.len() > MAX_ROOM_NAME_LEN
            || room_name.chars().any(char::is_control)
        {
            self.send_msg(
                id,
                &ServerMessage::RoomJoinDenied(RoomJoinDeniedMsg {
                    room: room_name.to_string(),
                    reason: "invalid room name".to_string(),
                }),
            );
            return;
        }

        // Leaving the previous room first keeps the location invariant: a
        // denied join leaves the connection in the lobby, not in limbo.
        if let Some(Location::Room(previous)) = self.registry.location(id).cloned() {
            if previous == room_name {
                return;
            }
            self.leave_room_with_broadcasts(id, &previous, &name);
            self.registry.set_location(id, Location::Lobby);
        }

        match self.rooms.join(room_name, id) {
            JoinOutcome::Denied(reason) => {
                tracing::debug!(connection = id, room = room_name, reason, "Join denied");
                self.send_msg(
                    id,
                    &ServerMessage::RoomJoinDenied(RoomJoinDeniedMsg {
                        room: room_name.to_string(),
                        reason: reason.to_string(),
                    }),
                );
            },
            outcome => {
                self.registry
                    .set_location(id, Location::Room(room_name.to_string()));
                if outcome == JoinOutcome::Created {
                    self.broadcast_room_list();
                    tracing::info!(room = room_name, creator = %name, "Room created");
                }
                self.broadcast_room_msg(
                    room_name,
                    &ServerMessage::RoomMemberJoined(MemberMsg { name }),
                    Some(id),
                );
                self.broadcast_room_msg(
                    room_name,
                    &ServerMessage::RoomMembers(RosterMsg {
                        names: self.room_roster(room_name),
                    }),
                    None,
                );
            },
        }
    }

    /// Record a ready vote. Returns the frozen roster when the room becomes
    /// full-ready so the caller can start the launch cycle outside the lock.
    pub fn mark_ready(&mut self, id: ConnectionId) -> Option<LaunchRequest> {
        let Some(Location::Room(room_name)) = self.registry.location(id).cloned() else {
            tracing::debug!(connection = id, "Ready vote outside a room dropped");
            return None;
        };
        match self.rooms.mark_ready(&room_name, id) {
            ReadyOutcome::NotAMember => {
                tracing::warn!(connection = id, room = %room_name, "Ready vote from non-member");
                None
            },
            ReadyOutcome::Ready {
                became_hidden,
                all_ready,
            } => {
                if became_hidden {
                    self.broadcast_room_list();
                }
                let ready_names: Vec<String> = self
                    .rooms
                    .ready_members(&room_name)
                    .iter()
                    .filter_map(|&m| self.registry.lookup_name(m).map(String::from))
                    .collect();
                self.broadcast_room_msg(
                    &room_name,
                    &ServerMessage::ReadyList(RosterMsg { names: ready_names }),
                    None,
                );
                if !all_ready {
                    return None;
                }
                let members = self.rooms.members(&room_name)?.to_vec();
                let participants: Vec<String> = members
                    .iter()
                    .filter_map(|&m| self.registry.lookup_name(m).map(String::from))
                    .collect();
                let avatars: Vec<Avatar> = members
                    .iter()
                    .filter_map(|&m| self.registry.avatar(m))
                    .collect();
                tracing::info!(room = %room_name, ?participants, "Room full-ready, launching session");
                Some(LaunchRequest {
                    room: room_name,
                    participants,
                    avatars,
                })
            },
        }
    }

    /// Move a room member back to the lobby.
    pub fn return_to_lobby(&mut self, id: ConnectionId) {
        let Some(name) = self.registry.lookup_name(id).map(String::from) else {
            return;
        };
        let Some(Location::Room(room_name)) = self.registry.location(id).cloned() else {
            return;
        };
        self.leave_room_with_broadcasts(id, &room_name, &name);
        self.registry.set_location(id, Location::Lobby);
        self.broadcast_lobby_msg(
            &ServerMessage::ReturnedToLobby(MemberMsg { name }),
            Some(id),
        );
        self.send_msg(
            id,
            &ServerMessage::LobbyMembers(RosterMsg {
                names: self.registry.lobby_roster(),
            }),
        );
    }

    /// Drop a closed connection, notifying whichever space it occupied.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some((name, location)) = self.registry.unregister(id) else {
            return;
        };
        let Some(name) = name else {
            return; // never registered, nothing to announce
        };
        match location {
            Location::Lobby => {
                self.broadcast_lobby_msg(
                    &ServerMessage::LobbyMemberLeft(MemberMsg { name: name.clone() }),
                    None,
                );
            },
            Location::Room(room_name) => {
                self.leave_room_with_broadcasts(id, &room_name, &name);
            },
        }
        tracing::info!(connection = id, name = %name, "Player disconnected");
    }

    /// Remove rooms with no activity past `max_idle`, returning their members
    /// to the lobby. Covers rooms stuck readying forever.
    pub fn sweep_idle_rooms(&mut self, max_idle: Duration) -> usize {
        let idle = self.rooms.idle_rooms(max_idle);
        let count = idle.len();
        for room_name in idle {
            let Some(members) = self.rooms.remove_room(&room_name) else {
                continue;
            };
            tracing::info!(room = %room_name, members = members.len(), "Removing idle room");
            for id in members {
                let Some(name) = self.registry.lookup_name(id).map(String::from) else {
                    continue;
                };
                self.registry.set_location(id, Location::Lobby);
                self.broadcast_lobby_msg(
                    &ServerMessage::ReturnedToLobby(MemberMsg { name }),
                    Some(id),
                );
                self.send_msg(
                    id,
                    &ServerMessage::LobbyMembers(RosterMsg {
                        names: self.registry.lobby_roster(),
                    }),
                );
            }
        }
        if count > 0 {
            self.broadcast_room_list();
        }
        count
    }

    /// Hand every member of a launched room its session endpoint.
    pub fn broadcast_game_port(&self, room_name: &str, port: u16) {
        self.broadcast_room_msg(
            room_name,
            &ServerMessage::GamePort(GamePortMsg { port }),
            None,
        );
    }

    pub fn room_exists(&self, room_name: &str) -> bool {
        self.rooms.room_exists(room_name)
    }

    /// Room member names in join order.
    fn room_roster(&self, room_name: &str) -> Vec<String> {
        self.rooms
            .members(room_name)
            .unwrap_or_default()
            .iter()
            .filter_map(|&m| self.registry.lookup_name(m).map(String::from))
            .collect()
    }

    /// Shared tail of leave/disconnect/switch: prune the membership, notify
    /// the remaining members, refresh the lobby list if the room vanished.
    fn leave_room_with_broadcasts(&mut self, id: ConnectionId, room_name: &str, name: &str) {
        let outcome = self.rooms.leave(room_name, id);
        if !outcome.was_member {
            return;
        }
        if outcome.room_removed {
            self.broadcast_room_list();
            tracing::info!(room = room_name, "Room emptied and removed");
            return;
        }
        self.broadcast_room_msg(
            room_name,
            &ServerMessage::RoomMemberLeft(MemberMsg {
                name: name.to_string(),
            }),
            None,
        );
        self.broadcast_room_msg(
            room_name,
            &ServerMessage::RoomMembers(RosterMsg {
                names: self.room_roster(room_name),
            }),
            None,
        );
        let ready_names: Vec<String> = self
            .rooms
            .ready_members(room_name)
            .iter()
            .filter_map(|&m| self.registry.lookup_name(m).map(String::from))
            .collect();
        self.broadcast_room_msg(
            room_name,
            &ServerMessage::ReadyList(RosterMsg { names: ready_names }),
            None,
        );
    }

    fn broadcast_room_list(&self) {
        self.broadcast_lobby_msg(
            &ServerMessage::RoomList(RoomListMsg {
                rooms: self.rooms.open_rooms(),
            }),
            None,
        );
    }

    fn send_msg(&self, id: ConnectionId, msg: &ServerMessage) {
        match encode_server_message(msg) {
            Ok(data) => self.registry.send_to(id, Bytes::from(data)),
            Err(e) => tracing::warn!(error = %e, "Failed to encode server message"),
        }
    }

    fn broadcast_lobby_msg(&self, msg: &ServerMessage, except: Option<ConnectionId>) {
        match encode_server_message(msg) {
            Ok(data) => self.registry.broadcast_lobby(&data, except),
            Err(e) => tracing::warn!(error = %e, "Failed to encode lobby broadcast"),
        }
    }

    fn broadcast_room_msg(&self, room_name: &str, msg: &ServerMessage, except: Option<ConnectionId>) {
        let Some(members) = self.rooms.members(room_name) else {
            return;
        };
        match encode_server_message(msg) {
            Ok(data) => self.registry.broadcast_to(members, &data, except),
            Err(e) => tracing::warn!(error = %e, "Failed to encode room broadcast"),
        }
    }
}

/// Run the launch/supervise/relaunch cycle for one full-ready room.
/// Fire-and-forget: coordinator operations never block on a running session.
pub fn spawn_session_cycle(shared: SharedLobby, request: LaunchRequest) {
    tokio::spawn(async move {
        run_session_cycle(shared, request).await;
    });
}

async fn run_session_cycle(shared: SharedLobby, request: LaunchRequest) {
    let launcher = shared.read().await.launcher();
    loop {
        let session = match launcher
            .launch(request.participants.clone(), request.avatars.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(room = %request.room, error = %e, "Session launch failed");
                return;
            },
        };

        {
            let lobby = shared.read().await;
            lobby.broadcast_game_port(&request.room, session.port);
        }

        let mut session = session;
        let restart = session.wait_restart_or_exit().await;
        if !restart {
            session.drain(&launcher).await;
            return;
        }

        // Full restart quorum: the old session drains on its own while a new
        // one is stood up on a fresh port for the identical roster.
        let drain_launcher = launcher.clone();
        tokio::spawn(async move {
            session.drain(&drain_launcher).await;
        });

        if !shared.read().await.room_exists(&request.room) {
            tracing::info!(room = %request.room, "Room gone, skipping session relaunch");
            return;
        }
    }
}
