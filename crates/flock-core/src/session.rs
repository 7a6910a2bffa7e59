use serde::{Deserialize, Serialize};

use crate::player::Avatar;

/// Everything a game session process needs to know, handed over as a single
/// JSON line on stdin at spawn time. The roster is frozen: membership changes
/// only take effect in the next spawned session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub port: u16,
    /// Participant display names in room-join order.
    pub participants: Vec<String>,
    /// Avatar selections parallel to `participants`.
    pub avatars: Vec<Avatar>,
    /// The authoritative participant. Computed from join order by the
    /// launcher; the relay never infers it positionally.
    pub boss: String,
}

impl SpawnConfig {
    /// Build a spawn config from a join-ordered roster. The first joiner is
    /// the boss. Returns `None` for an empty roster or mismatched avatars.
    pub fn from_join_order(port: u16, participants: Vec<String>, avatars: Vec<Avatar>) -> Option<Self> {
        if participants.is_empty() || participants.len() != avatars.len() {
            return None;
        }
        let boss = participants[0].clone();
        Some(Self {
            port,
            participants,
            avatars,
            boss,
        })
    }
}

/// Status line a session prints once its listener is bound.
pub fn listening_line(port: u16) -> String {
    format!("listening {port}")
}

/// Parse a `listening <port>` status line.
pub fn parse_listening(line: &str) -> Option<u16> {
    line.trim().strip_prefix("listening ")?.parse().ok()
}

/// Status lines from a session are free-form; any line mentioning `restart`
/// asks the launcher for a full re-launch with the identical roster.
pub fn is_restart_request(line: &str) -> bool {
    line.contains("restart")
}
