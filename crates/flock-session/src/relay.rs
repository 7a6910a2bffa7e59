use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use flock_core::net::messages::{
    HighScoresMsg, MessageType, RestartMsg, ServerMessage, StartMsg, SubmitHighScoreMsg,
};
use flock_core::net::protocol::{
    decode_message_type, decode_payload, encode_server_message, relay_retag, retag,
};
use flock_core::player::Avatar;
use flock_core::score::{ScoreRecord, TOP_SCORES};
use flock_core::session::SpawnConfig;

use crate::score_store::ScoreStore;

/// Identifies one socket connected to this session.
pub type ParticipantId = u64;

pub type ParticipantSender = mpsc::UnboundedSender<Vec<u8>>;

/// Out-of-band signals surfaced to the supervising launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    RestartRequested,
}

/// The per-room authoritative relay. No simulation logic: a message router
/// plus membership/role tracking over a roster frozen at launch.
pub struct SessionRelay {
    participants: Vec<String>,
    avatars: Vec<Avatar>,
    boss_name: String,
    connections: HashMap<ParticipantId, ParticipantSender>,
    next_id: ParticipantId,
    /// Connections seen so far. Monotonic: the start broadcast keys off the
    /// first time it reaches the roster size.
    connected: usize,
    boss_conn: Option<ParticipantId>,
    restart_requests: HashSet<String>,
    restart_signaled: bool,
    started: bool,
    last_submitted: Option<ScoreRecord>,
    store: Arc<dyn ScoreStore>,
    status_tx: mpsc::UnboundedSender<StatusEvent>,
}

impl SessionRelay {
    pub fn new(
        spawn: &SpawnConfig,
        store: Arc<dyn ScoreStore>,
        status_tx: mpsc::UnboundedSender<StatusEvent>,
    ) -> Self {
        Self {
            participants: spawn.participants.clone(),
            avatars: spawn.avatars.clone(),
            boss_name: spawn.boss.clone(),
            connections: HashMap::new(),
            next_id: 1,
            connected: 0,
            boss_conn: None,
            restart_requests: HashSet::new(),
            restart_signaled: false,
            started: false,
            last_submitted: None,
            store,
            status_tx,
        }
    }

    /// Register a new socket. Fires the start broadcast exactly once, the
    /// first time every participant is connected.
    pub fn add_connection(&mut self, tx: ParticipantSender) -> ParticipantId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, tx);
        self.connected += 1;
        tracing::info!(
            participant = id,
            connected = self.connected,
            expected = self.participants.len(),
            "Participant connected"
        );

        if !self.started && self.connected == self.participants.len() {
            self.started = true;
            let msg = ServerMessage::Start(StartMsg {
                participants: self.participants.clone(),
                boss: self.boss_name.clone(),
                avatars: self.avatars.clone(),
            });
            match encode_server_message(&msg) {
                Ok(data) => {
                    tracing::info!(boss = %self.boss_name, "All participants connected, starting");
                    self.broadcast(&data, None);
                },
                Err(e) => tracing::error!(error = %e, "Failed to encode start broadcast"),
            }
        }
        id
    }

    pub fn remove_connection(&mut self, id: ParticipantId) {
        self.connections.remove(&id);
        if self.boss_conn == Some(id) {
            self.boss_conn = None;
            tracing::warn!(participant = id, "Boss connection lost");
        }
    }

    /// Route one inbound frame. Relay paths never decode the payload they
    /// forward; only membership/role/score messages are parsed.
    pub fn handle_frame(&mut self, from: ParticipantId, data: &[u8]) {
        let msg_type = match decode_message_type(data) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(participant = from, error = %e, "Undecodable frame dropped");
                return;
            },
        };

        match msg_type {
            MessageType::AnnounceName => {
                if let Ok(msg) =
                    decode_payload::<flock_core::net::messages::AnnounceNameMsg>(data)
                {
                    self.announce(from, &msg.name);
                }
            },
            MessageType::PlayerAction => {
                let frame = retag(data, MessageType::PlebAction);
                // Forward to the authority when known; until a boss announces,
                // broadcast so a late boss still sees live inputs.
                match self.boss_conn {
                    Some(boss) if boss != from => self.send_to(boss, &frame),
                    _ => self.broadcast(&frame, Some(from)),
                }
            },
            MessageType::Snapshot | MessageType::PipeHole | MessageType::Score => {
                // Trust-the-sender: no origin check, payload bytes untouched.
                if let Some(out) = relay_retag(msg_type) {
                    let frame = retag(data, out);
                    self.broadcast(&frame, Some(from));
                }
            },
            MessageType::Restart => {
                if let Ok(msg) = decode_payload::<RestartMsg>(data) {
                    self.request_restart(&msg.name);
                }
            },
            MessageType::GetHighScores => self.broadcast_high_scores(),
            MessageType::SubmitHighScore => {
                if let Ok(msg) = decode_payload::<SubmitHighScoreMsg>(data) {
                    self.submit_high_score(msg);
                }
            },
            other => {
                tracing::debug!(participant = from, ?other, "Unexpected session frame dropped");
            },
        }
    }

    /// Record the boss connection when the declared name matches. Idempotent.
    fn announce(&mut self, from: ParticipantId, name: &str) {
        if name == self.boss_name {
            self.boss_conn = Some(from);
            tracing::info!(participant = from, name, "Boss announced");
        }
    }

    fn request_restart(&mut self, name: &str) {
        self.restart_requests.insert(name.to_string());
        tracing::info!(
            name,
            votes = self.restart_requests.len(),
            needed = self.participants.len(),
            "Restart requested"
        );
        if !self.restart_signaled && self.restart_requests.len() == self.participants.len() {
            self.restart_signaled = true;
            if self.status_tx.send(StatusEvent::RestartRequested).is_err() {
                tracing::warn!("Status channel closed, restart request lost");
            }
        }
    }

    /// Read-through to the store; everyone sees the board.
    fn broadcast_high_scores(&mut self) {
        let records = match self.store.fetch_top(TOP_SCORES) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "High-score fetch failed");
                return;
            },
        };
        let msg = ServerMessage::HighScores(HighScoresMsg {
            records,
            last: self.last_submitted.clone(),
        });
        match encode_server_message(&msg) {
            Ok(data) => self.broadcast(&data, None),
            Err(e) => tracing::warn!(error = %e, "Failed to encode high scores"),
        }
    }

    fn submit_high_score(&mut self, msg: SubmitHighScoreMsg) {
        let record = ScoreRecord {
            username: msg.username,
            score: msg.score,
        };
        if let Err(e) = self.store.insert(record.clone()) {
            tracing::warn!(error = %e, "High-score insert failed");
            return;
        }
        self.last_submitted = Some(record);
    }

    fn send_to(&self, id: ParticipantId, data: &[u8]) {
        if let Some(tx) = self.connections.get(&id)
            && tx.send(data.to_vec()).is_err()
        {
            tracing::debug!(participant = id, "Send to closed participant dropped");
        }
    }

    fn broadcast(&self, data: &[u8], except: Option<ParticipantId>) {
        for (&id, tx) in &self.connections {
            if Some(id) == except {
                continue;
            }
            if tx.send(data.to_vec()).is_err() {
                tracing::debug!(participant = id, "Broadcast to closed participant dropped");
            }
        }
    }

    #[cfg(test)]
    fn has_boss(&self) -> bool {
        self.boss_conn.is_some()
    }
}
