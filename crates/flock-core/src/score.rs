use serde::{Deserialize, Serialize};

/// One persisted high-score entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub username: String,
    pub score: u32,
}

/// How many records the read path returns.
pub const TOP_SCORES: usize = 10;
