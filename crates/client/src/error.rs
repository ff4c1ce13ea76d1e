//! Error types surfaced by the session client.

use thiserror::Error;

/// Failure of the push channel itself. Recovered by the supervisor and never
/// returned from the public command surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("transport closed")]
    Closed,
}

/// Why `start_game` refused to send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartGameError {
    #[error("Cannot start game: no players have joined yet. Wait for at least one player to scan the QR code.")]
    NoPlayers,
    /// The status endpoint knows about more players than the push channel
    /// has delivered. Callers may retry with `SyncPolicy::Override`.
    #[error("Player sync in progress ({ready}/{expected} ready). Please wait a moment...")]
    SyncPending { ready: usize, expected: u32 },
    #[error("session client has been torn down")]
    Closed,
}

impl StartGameError {
    pub fn is_overridable(&self) -> bool {
        matches!(self, StartGameError::SyncPending { .. })
    }
}
