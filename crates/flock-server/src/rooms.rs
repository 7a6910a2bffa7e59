use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::registry::ConnectionId;

/// Lifecycle of a room. `Open` rooms are discoverable and joinable; the first
/// ready vote hides the room from the lobby list and closes it to new joins;
/// `Launched` rooms are retained for restart bookkeeping until they empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Open,
    Readying,
    Launched,
}

struct Room {
    /// Join order; index 0 will be the boss of the next launched session.
    members: Vec<ConnectionId>,
    ready: HashSet<ConnectionId>,
    phase: RoomPhase,
    last_activity: Instant,
}

impl Room {
    fn new(creator: ConnectionId) -> Self {
        Self {
            members: vec![creator],
            ready: HashSet::new(),
            phase: RoomPhase::Open,
            last_activity: Instant::now(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Room did not exist; this connection created it.
    Created,
    Joined,
    /// Room is readying or launched; new joins are rejected.
    Denied(&'static str),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    NotAMember,
    Ready {
        /// First ready vote in the room: it just left the open-room list.
        became_hidden: bool,
        /// Every member is now ready; the session should launch.
        all_ready: bool,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub was_member: bool,
    pub room_removed: bool,
}

/// Owns the room table: ordered membership, ready votes, phase transitions.
/// Pure bookkeeping; all broadcasting is done by the lobby coordinator.
pub struct RoomCoordinator {
    rooms: HashMap<String, Room>,
}

impl Default for RoomCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCoordinator {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Enroll a connection in a room, creating the room on first use.
    pub fn join(&mut self, room_name: &str, id: ConnectionId) -> JoinOutcome {
        match self.rooms.get_mut(room_name) {
            None => {
                self.rooms.insert(room_name.to_string(), Room::new(id));
                JoinOutcome::Created
            },
            Some(room) => {
                if room.phase != RoomPhase::Open {
                    return JoinOutcome::Denied("room is no longer joinable");
                }
                room.last_activity = Instant::now();
                if !room.members.contains(&id) {
                    room.members.push(id);
                }
                JoinOutcome::Joined
            },
        }
    }

    /// Record a ready vote. The ready set is always a subset of the members.
    pub fn mark_ready(&mut self, room_name: &str, id: ConnectionId) -> ReadyOutcome {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return ReadyOutcome::NotAMember;
        };
        if !room.members.contains(&id) {
            return ReadyOutcome::NotAMember;
        }
        room.last_activity = Instant::now();
        room.ready.insert(id);

        let became_hidden = room.phase == RoomPhase::Open;
        if became_hidden {
            room.phase = RoomPhase::Readying;
        }
        let all_ready = room.ready.len() == room.members.len();
        if all_ready {
            room.phase = RoomPhase::Launched;
        }
        ReadyOutcome::Ready {
            became_hidden,
            all_ready,
        }
    }

    /// Remove a connection from a room's member and ready sets. Deletes the
    /// room when its last member leaves.
    pub fn leave(&mut self, room_name: &str, id: ConnectionId) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return LeaveOutcome {
                was_member: false,
                room_removed: false,
            };
        };
        let was_member = room.members.contains(&id);
        room.members.retain(|&m| m != id);
        room.ready.remove(&id);
        room.last_activity = Instant::now();

        let room_removed = room.members.is_empty();
        if room_removed {
            self.rooms.remove(room_name);
        }
        LeaveOutcome {
            was_member,
            room_removed,
        }
    }

    /// Names of rooms that are still discoverable, sorted for stable output.
    pub fn open_rooms(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, r)| r.phase == RoomPhase::Open)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Member connections in join order.
    pub fn members(&self, room_name: &str) -> Option<&[ConnectionId]> {
        self.rooms.get(room_name).map(|r| r.members.as_slice())
    }

    /// Ready members in join order.
    pub fn ready_members(&self, room_name: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_name)
            .map(|r| {
                r.members
                    .iter()
                    .copied()
                    .filter(|id| r.ready.contains(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn phase(&self, room_name: &str) -> Option<RoomPhase> {
        self.rooms.get(room_name).map(|r| r.phase)
    }

    pub fn room_exists(&self, room_name: &str) -> bool {
        self.rooms.contains_key(room_name)
    }

    /// Rooms with no activity for longer than `max_idle`.
    pub fn idle_rooms(&self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        self.rooms
            .iter()
            .filter(|(_, r)| now.duration_since(r.last_activity) >= max_idle)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Forcibly remove a room, returning its members for relocation.
    pub fn remove_room(&mut self, room_name: &str) -> Option<Vec<ConnectionId>> {
        self.rooms.remove(room_name).map(|r| r.members)
    }

    #[cfg(test)]
    fn age_room(&mut self, room_name: &str, by: Duration) {
        if let Some(room) = self.rooms.get_mut(room_name) {
            room.last_activity = Instant::now() - by;
        }
    }
}
