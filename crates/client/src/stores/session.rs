//! Session state store: latest game status and roster for one session.
//!
//! The store has a single writer (the reconciler task). Readers hold a
//! [`StoreReader`] and see whole snapshots; a roster is never observed
//! half-applied because every write happens inside one
//! `watch::Sender::send_if_modified` call.

use quizroom_shared::{GameStatus, Player, Roster};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Agreement between the push channel roster and the poller's player total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Settled,
    /// The server reports more players than the channel has delivered.
    Pending { ready: usize, expected: u32 },
}

impl SyncState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub game_status: Option<GameStatus>,
    /// Owned by the push channel.
    pub roster: Roster,
    /// Server-side player total used for the sync check. Taken from polls
    /// while the poller runs, and from channel status updates while it is idle.
    pub reported_total: Option<u32>,
    /// Whether the status poller is currently running.
    pub poller_active: bool,
    /// Number of writes applied so far.
    pub revision: u64,
}

impl SessionState {
    pub fn sync_state(&self) -> SyncState {
        let ready = self.roster.len();
        match self.reported_total {
            Some(expected) if expected as usize > ready => SyncState::Pending { ready, expected },
            _ => SyncState::Settled,
        }
    }
}

/// Write side of the store. Owned by the reconciler.
pub struct SessionStateStore {
    tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl SessionStateStore {
    /// Create a store that stops accepting writes once `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx, cancel }
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Apply one mutation atomically. `f` returns whether it changed the
    /// state; readers are notified only then. Returns `false` without calling
    /// `f` once the store is closed.
    pub fn apply(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send_if_modified(|state| {
            let changed = f(state);
            if changed {
                state.revision += 1;
            }
            changed
        })
    }
}

/// Read side of the store.
#[derive(Debug, Clone)]
pub struct StoreReader {
    rx: watch::Receiver<SessionState>,
}

impl StoreReader {
    pub fn snapshot(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn game_status(&self) -> Option<GameStatus> {
        self.rx.borrow().game_status.clone()
    }

    pub fn roster(&self) -> Vec<Player> {
        self.rx.borrow().roster.to_vec()
    }

    pub fn roster_len(&self) -> usize {
        self.rx.borrow().roster.len()
    }

    pub fn sync_state(&self) -> SyncState {
        self.rx.borrow().sync_state()
    }

    pub fn revision(&self) -> u64 {
        self.rx.borrow().revision
    }

    /// Wait for the next write. Fails once the writer is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Raw receiver for callers that integrate with other reactive code.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.rx.clone()
    }
}
