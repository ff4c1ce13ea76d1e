//! Session push-channel frames.
//!
//! Every frame is a JSON object discriminated by its `type` field. Frames
//! with a `type` this client does not know decode to [`ServerEvent::Unknown`]
//! so the caller can drop them without tearing the connection down.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::models::{GameStatus, Player};

/// Commands the client sends to the session server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    RequestRoster,
    StartGame,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::RequestRoster => "request_roster",
            ClientCommand::StartGame => "start_game",
        }
    }
}

/// Frames received from the session server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full, authoritative player list.
    RosterUpdate { players: Vec<Player> },
    /// Full game status snapshot.
    StatusUpdate { game_status: GameStatus },
    PlayerJoined { player: Player },
    PlayerLeft { player_id: String },
    /// Command frames relayed back by the server to every participant.
    RequestRoster,
    StartGame,
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::RosterUpdate { .. } => "roster_update",
            ServerEvent::StatusUpdate { .. } => "status_update",
            ServerEvent::PlayerJoined { .. } => "player_joined",
            ServerEvent::PlayerLeft { .. } => "player_left",
            ServerEvent::RequestRoster => "request_roster",
            ServerEvent::StartGame => "start_game",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Decode one text frame from the push channel.
pub fn decode_server_frame(text: &str) -> Result<ServerEvent, FrameError> {
    serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))
}

/// Encode one outbound command frame.
pub fn encode_client_command(cmd: &ClientCommand) -> Result<String, FrameError> {
    serde_json::to_string(cmd).map_err(|e| FrameError::Encode(e.to_string()))
}
