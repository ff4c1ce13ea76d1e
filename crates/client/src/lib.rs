//! Quizroom Client - session synchronization for quiz hosts
//!
//! Keeps a host's view of one quiz session (players, game status,
//! connection health) current by combining a WebSocket push channel with
//! periodic status polling, and sends the host's commands back.

pub mod api_client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod poller;
pub mod reconciler;
pub mod session;
pub mod stores;
pub mod ws;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use api_client::ApiClient;
pub use config::{ConfigError, PollMode, SyncConfig};
pub use dispatcher::{CommandDispatcher, StartReceipt, SyncPolicy};
pub use error::{StartGameError, TransportError};
pub use poller::StatusSource;
pub use reconciler::{reconcile, Applied, SyncEvent};
pub use session::SessionClient;
pub use stores::{SessionState, StoreReader, SyncState};
pub use ws::{ConnectionState, Connector, ReconnectConfig, TungsteniteConnector};

pub use quizroom_shared::{GameState, GameStatus, Player, Roster, SessionCode};
