use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of selectable bird variants.
pub const AVATAR_COUNT: u8 = 3;

/// Maximum length of a display name in characters.
pub const MAX_NAME_LEN: usize = 32;

/// A player's chosen bird variant, an index into a fixed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Avatar(u8);

impl Avatar {
    /// Construct from a selection index. Returns `None` for out-of-range values.
    pub fn new(index: u8) -> Option<Self> {
        (index < AVATAR_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Validate a display name: non-empty after trimming, bounded, printable.
pub fn is_valid_display_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.len() <= MAX_NAME_LEN && !trimmed.chars().any(char::is_control)
}

/// One player's simulation state as carried in a boss snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub alive: bool,
    pub velocity_y: f32,
}

/// A full boss-produced snapshot: every player's state keyed by display name.
/// Ordered map so encoded snapshots are byte-stable for a given state.
pub type Snapshot = BTreeMap<String, PlayerState>;
