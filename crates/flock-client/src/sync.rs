//! The message contract both client roles honor. The boss turns its local
//! simulation into outbound traffic; plebs forward raw input and overwrite
//! their view from inbound snapshots. Neither role predicts or reconciles.

use std::time::{Duration, Instant};

use flock_core::net::messages::{
    ClientMessage, GetHighScoresMsg, PipeHoleMsg, PlayerAction, PlayerActionMsg, ScoreMsg,
    ServerMessage, SnapshotMsg, SubmitHighScoreMsg,
};
use flock_core::player::Snapshot;
use flock_core::score::ScoreRecord;

use crate::pipes::{PipePair, pipes_for_hole};

/// Default snapshot cadence: 20 Hz, driven by a timer so the broadcast rate
/// stays fixed even when the render rate wobbles.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(50);

/// Boss-side emission state.
pub struct BossSync {
    interval: Duration,
    next_due: Option<Instant>,
    score: u32,
}

impl Default for BossSync {
    fn default() -> Self {
        Self::new(SNAPSHOT_INTERVAL)
    }
}

impl BossSync {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
            score: 0,
        }
    }

    /// Whether a snapshot should be emitted at `now`. Call once per timer
    /// tick; emission times advance on a fixed grid, not from when the caller
    /// happened to observe them.
    pub fn snapshot_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            None => {
                self.next_due = Some(now + self.interval);
                true
            },
            Some(due) if now >= due => {
                self.next_due = Some(due + self.interval);
                true
            },
            Some(_) => false,
        }
    }

    /// Serialize every live player's state into one snapshot message.
    pub fn snapshot(players: Snapshot) -> ClientMessage {
        ClientMessage::Snapshot(SnapshotMsg { players })
    }

    /// Pick the obstacle layout for a spawn tick. The message must be sent
    /// before the boss applies the returned pair locally, so plebs construct
    /// the same pipes for the same tick.
    pub fn spawn_pipes(hole: u32) -> (ClientMessage, PipePair) {
        (
            ClientMessage::PipeHole(PipeHoleMsg { hole }),
            pipes_for_hole(hole),
        )
    }

    /// Record a point and emit the new total.
    pub fn score_up(&mut self) -> ClientMessage {
        self.score += 1;
        ClientMessage::Score(ScoreMsg { score: self.score })
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// On local game-over the boss fetches the board for everyone.
    pub fn game_over(&self) -> ClientMessage {
        ClientMessage::GetHighScores(GetHighScoresMsg {})
    }

    /// Submit the boss player's own run, if it is human-controlled.
    pub fn submit_score(&self, username: &str) -> ClientMessage {
        ClientMessage::SubmitHighScore(SubmitHighScoreMsg {
            username: username.to_string(),
            score: self.score,
        })
    }
}

/// What an inbound message means for the local game, after the view has
/// absorbed it.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The session reached quorum; simulation begins this tick.
    Started { participants: Vec<String>, boss: String },
    /// The view was overwritten from a boss snapshot.
    SnapshotApplied,
    /// Construct these pipes now; geometry is shared with the boss.
    SpawnPipes(PipePair),
    /// A pleb's forwarded input, for the boss to feed its simulation.
    PlebInput { name: String, action: PlayerAction },
    ScoreChanged(u32),
    HighScores {
        records: Vec<ScoreRecord>,
        last: Option<ScoreRecord>,
    },
}

/// Pleb-side view of the shared simulation, also used by the boss to consume
/// forwarded inputs. Inbound snapshots replace the whole view verbatim; no
/// interpolation, no reconciliation against predicted state.
pub struct PlebView {
    name: String,
    players: Snapshot,
    score: u32,
}

impl PlebView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            players: Snapshot::new(),
            score: 0,
        }
    }

    /// Turn a local input event into the outbound message. The input is never
    /// applied locally; motion arrives with the next snapshot.
    pub fn input(&self, action: PlayerAction) -> ClientMessage {
        ClientMessage::PlayerAction(PlayerActionMsg {
            action,
            name: self.name.clone(),
        })
    }

    /// Absorb an inbound session message into the view.
    pub fn apply(&mut self, msg: &ServerMessage) -> Option<ViewEvent> {
        match msg {
            ServerMessage::Start(s) => Some(ViewEvent::Started {
                participants: s.participants.clone(),
                boss: s.boss.clone(),
            }),
            ServerMessage::SnapshotUpdate(s) => {
                self.players = s.players.clone();
                Some(ViewEvent::SnapshotApplied)
            },
            ServerMessage::CreatePipes(p) => Some(ViewEvent::SpawnPipes(pipes_for_hole(p.hole))),
            ServerMessage::ScoreUpdate(s) => {
                self.score = s.score;
                Some(ViewEvent::ScoreChanged(s.score))
            },
            ServerMessage::PlebAction(a) => Some(ViewEvent::PlebInput {
                name: a.name.clone(),
                action: a.action,
            }),
            ServerMessage::HighScores(h) => Some(ViewEvent::HighScores {
                records: h.records.clone(),
                last: h.last.clone(),
            }),
            _ => None,
        }
    }

    pub fn players(&self) -> &Snapshot {
        &self.players
    }

    pub fn score(&self) -> u32 {
        self.score
    }
}
