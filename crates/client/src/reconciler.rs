//! Merges push-channel frames and poll results into the session store.
//!
//! Precedence:
//! - the roster comes only from the push channel; `roster_update` replaces
//!   it wholesale, `player_joined` / `player_left` edit one entry;
//! - game status is replaced wholesale by either source, unless it would move
//!   the session backwards (`finished` → `active` → `waiting`);
//! - the player total used for the sync check comes from the poller while it
//!   runs; while it is idle, channel `status_update` frames refresh it.

use quizroom_shared::{GameStatus, Roster, ServerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::stores::{SessionState, SessionStateStore};

/// One input to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A decoded frame from the push channel.
    Channel(ServerEvent),
    /// A successful status poll.
    Polled(GameStatus),
    /// The poller started or stopped.
    PollerActive(bool),
}

/// What [`reconcile`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
    /// Older than the state already held; discarded.
    Stale,
    /// Not a state-bearing frame.
    Ignored,
}

impl Applied {
    pub fn is_change(self) -> bool {
        self == Applied::Changed
    }
}

/// Apply one event to `state`.
pub fn reconcile(state: &mut SessionState, event: SyncEvent) -> Applied {
    match event {
        SyncEvent::Channel(ServerEvent::RosterUpdate { players }) => {
            let roster = Roster::from_players(players);
            if state.roster == roster {
                Applied::Unchanged
            } else {
                state.roster = roster;
                Applied::Changed
            }
        }
        SyncEvent::Channel(ServerEvent::StatusUpdate { game_status }) => {
            if state.poller_active {
                replace_status(state, game_status)
            } else {
                apply_status_with_total(state, game_status)
            }
        }
        SyncEvent::Channel(ServerEvent::PlayerJoined { player }) => {
            if state.roster.upsert(player) {
                Applied::Changed
            } else {
                Applied::Unchanged
            }
        }
        SyncEvent::Channel(ServerEvent::PlayerLeft { player_id }) => {
            if state.roster.remove(&player_id).is_some() {
                Applied::Changed
            } else {
                Applied::Unchanged
            }
        }
        SyncEvent::Channel(
            ServerEvent::RequestRoster | ServerEvent::StartGame | ServerEvent::Unknown,
        ) => Applied::Ignored,
        SyncEvent::Polled(status) => apply_status_with_total(state, status),
        SyncEvent::PollerActive(active) => {
            if state.poller_active == active {
                Applied::Unchanged
            } else {
                state.poller_active = active;
                Applied::Changed
            }
        }
    }
}

/// Replace the status and take its player total for the sync check. A stale
/// status is dropped entirely, total included.
fn apply_status_with_total(state: &mut SessionState, status: GameStatus) -> Applied {
    if let Some(current) = &state.game_status {
        if status.is_stale_against(current) {
            return Applied::Stale;
        }
    }
    let total = status.total_players();
    let total_changed = state.reported_total != Some(total);
    state.reported_total = Some(total);
    match replace_status(state, status) {
        Applied::Changed => Applied::Changed,
        _ if total_changed => Applied::Changed,
        other => other,
    }
}

fn replace_status(state: &mut SessionState, status: GameStatus) -> Applied {
    match &state.game_status {
        Some(current) if status.is_stale_against(current) => Applied::Stale,
        Some(current) if *current == status => Applied::Unchanged,
        _ => {
            state.game_status = Some(status);
            Applied::Changed
        }
    }
}

/// Task that owns the store and applies queued events one at a time.
pub struct Reconciler {
    store: SessionStateStore,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(
        store: SessionStateStore,
        events: mpsc::UnboundedReceiver<SyncEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            events,
            cancel,
        }
    }

    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let label = event_label(&event);
            let mut outcome = Applied::Unchanged;
            let written = self.store.apply(|state| {
                outcome = reconcile(state, event);
                outcome.is_change()
            });

            match outcome {
                Applied::Stale => crate::log_debug!("Discarded stale {}", label),
                Applied::Ignored => crate::log_debug!("Ignored {} frame", label),
                _ if written => crate::log_debug!("Applied {}", label),
                _ => {}
            }
        }
        self.events.close();
    }
}

fn event_label(event: &SyncEvent) -> &'static str {
    match event {
        SyncEvent::Channel(frame) => frame.kind(),
        SyncEvent::Polled(_) => "status poll",
        SyncEvent::PollerActive(_) => "poller activity",
    }
}
