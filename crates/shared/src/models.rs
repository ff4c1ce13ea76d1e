//! Session data model shared by the push channel and the status endpoint.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionCodeError;

// --- Session identity ---

/// Opaque identifier of one hosted session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    pub fn new(code: impl Into<String>) -> Result<Self, SessionCodeError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(SessionCodeError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionCode {
    type Err = SessionCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// --- Players ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub player_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
    /// `None` until the server has confirmed a live connection for the player.
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
}

impl Player {
    /// Name to show for the player, falling back to the id.
    pub fn display_name(&self) -> &str {
        match self.player_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.player_id,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.connected_at.is_some()
    }
}

/// Players of a session in arrival order, unique by `player_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from a server snapshot. A repeated id updates the
    /// earlier entry in place.
    pub fn from_players(players: impl IntoIterator<Item = Player>) -> Self {
        let mut roster = Self::new();
        for player in players {
            roster.upsert(player);
        }
        roster
    }

    /// Insert a player, or replace the entry with the same id without
    /// changing its position. Returns `true` if the roster changed.
    pub fn upsert(&mut self, player: Player) -> bool {
        match self
            .players
            .iter_mut()
            .find(|p| p.player_id == player.player_id)
        {
            Some(existing) if *existing == player => false,
            Some(existing) => {
                *existing = player;
                true
            }
            None => {
                self.players.push(player);
                true
            }
        }
    }

    /// Remove a player by id. Returns the removed entry.
    pub fn remove(&mut self, player_id: &str) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.player_id == player_id)?;
        Some(self.players.remove(idx))
    }

    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of players whose live connection has been confirmed.
    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_ready()).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Player> {
        self.players.iter()
    }

    pub fn as_slice(&self) -> &[Player] {
        &self.players
    }

    pub fn to_vec(&self) -> Vec<Player> {
        self.players.clone()
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a Player;
    type IntoIter = std::slice::Iter<'a, Player>;

    fn into_iter(self) -> Self::IntoIter {
        self.players.iter()
    }
}

// --- Game status ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Waiting,
    Active,
    Finished,
}

impl GameState {
    /// Position in the session lifecycle. A status with a lower rank than the
    /// one already held is stale.
    pub fn rank(self) -> u8 {
        match self {
            GameState::Waiting => 0,
            GameState::Active => 1,
            GameState::Finished => 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerResponseCounts {
    #[serde(default)]
    pub total: u32,
    /// Counters this client does not interpret, kept as received.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStatus {
    pub game_state: GameState,
    #[serde(default)]
    pub player_response_counts: PlayerResponseCounts,
}

impl GameStatus {
    pub fn waiting(total: u32) -> Self {
        Self {
            game_state: GameState::Waiting,
            player_response_counts: PlayerResponseCounts {
                total,
                other: BTreeMap::new(),
            },
        }
    }

    pub fn is_active(&self) -> bool {
        self.game_state == GameState::Active
    }

    pub fn total_players(&self) -> u32 {
        self.player_response_counts.total
    }

    /// Whether `self` would move the session backwards relative to `current`.
    pub fn is_stale_against(&self, current: &GameStatus) -> bool {
        self.game_state.rank() < current.game_state.rank()
    }
}
