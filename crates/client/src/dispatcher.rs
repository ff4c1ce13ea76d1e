//! Outbound session commands.

use std::time::Duration;

use quizroom_shared::ClientCommand;
use tokio::time::timeout;

use crate::error::StartGameError;
use crate::stores::{StoreReader, SyncState};
use crate::ws::WsHandle;

/// Whether `start_game` may proceed while the roster is still catching up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Refuse while the poller reports more players than the roster holds.
    #[default]
    Require,
    /// Start anyway. Some players may not be fully connected yet.
    Override,
}

/// Outcome of a `start_game` call that passed its local checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReceipt {
    /// The transport accepted the frame within the flush window.
    pub flushed: bool,
    /// Roster size when the command was issued.
    pub player_count: usize,
}

/// Sends commands through the push channel. Cheap to clone.
#[derive(Clone)]
pub struct CommandDispatcher {
    handle: WsHandle,
    state: StoreReader,
    flush_delay: Duration,
}

impl CommandDispatcher {
    pub fn new(handle: WsHandle, state: StoreReader, flush_delay: Duration) -> Self {
        Self {
            handle,
            state,
            flush_delay,
        }
    }

    /// Ask the server to broadcast the current roster. Safe to call any
    /// number of times; frames queued while offline go out on reconnect.
    pub fn request_roster(&self) {
        match self.handle.enqueue(ClientCommand::RequestRoster) {
            Ok(_) => crate::log_info!("Requested roster for session {}", self.handle.session),
            Err(e) => crate::log_warn!(
                "Roster request for session {} not sent: {}",
                self.handle.session,
                e
            ),
        }
    }

    /// Local preconditions for starting the game. Returns the roster size.
    pub fn check_start(&self, policy: SyncPolicy) -> Result<usize, StartGameError> {
        if self.handle.is_closed() {
            return Err(StartGameError::Closed);
        }

        let snapshot = self.state.snapshot();
        let player_count = snapshot.roster.len();
        if player_count == 0 {
            return Err(StartGameError::NoPlayers);
        }

        if let SyncState::Pending { ready, expected } = snapshot.sync_state() {
            match policy {
                SyncPolicy::Require => {
                    return Err(StartGameError::SyncPending { ready, expected });
                }
                SyncPolicy::Override => crate::log_warn!(
                    "Some players may not be fully connected ({}/{} ready). Starting anyway...",
                    ready,
                    expected
                ),
            }
        }

        Ok(player_count)
    }

    /// Tell the server to start the game.
    ///
    /// Resolves once the flush delay has elapsed after the frame was queued.
    /// There is no server acknowledgement; a frame the transport could not
    /// write in time is reported as `flushed == false`.
    pub async fn start_game(&self, policy: SyncPolicy) -> Result<StartReceipt, StartGameError> {
        let player_count = self.check_start(policy)?;

        let delivery = self
            .handle
            .enqueue(ClientCommand::StartGame)
            .map_err(|_| StartGameError::Closed)?;
        crate::log_info!(
            "Starting game for session {} with {} players",
            self.handle.session,
            player_count
        );

        let flush = self.flush_delay;
        let ((), flushed) = tokio::join!(tokio::time::sleep(flush), async {
            matches!(timeout(flush, delivery.accepted()).await, Ok(Ok(())))
        });

        if !flushed {
            crate::log_warn!(
                "start_game for session {} was not written within {}ms",
                self.handle.session,
                flush.as_millis()
            );
        }

        Ok(StartReceipt {
            flushed,
            player_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::SessionStateStore;
    use crate::ws::outbound_queue;
    use futures_util::{FutureExt, StreamExt};
    use quizroom_shared::{GameStatus, Player, Roster};
    use tokio_util::sync::CancellationToken;

    fn players(n: usize) -> Roster {
        Roster::from_players((0..n).map(|i| Player {
            player_id: format!("p{i}"),
            player_name: None,
            connected_at: None,
        }))
    }

    fn setup(
        roster: usize,
        polled: Option<u32>,
    ) -> (CommandDispatcher, crate::ws::OutboundQueue, SessionStateStore) {
        let store = SessionStateStore::new(CancellationToken::new());
        store.apply(|s| {
            s.roster = players(roster);
            s.reported_total = polled;
            s.game_status = polled.map(GameStatus::waiting);
            true
        });
        let (tx, queue) = outbound_queue();
        let handle = WsHandle::new(tx, "AB12".into());
        let dispatcher = CommandDispatcher::new(handle, store.reader(), Duration::from_millis(200));
        (dispatcher, queue, store)
    }

    #[tokio::test]
    async fn empty_roster_never_sends() {
        let (dispatcher, queue, _store) = setup(0, None);
        for policy in [SyncPolicy::Require, SyncPolicy::Override] {
            assert_eq!(
                dispatcher.start_game(policy).await,
                Err(StartGameError::NoPlayers)
            );
        }
        assert!(queue.lock().await.next().now_or_never().is_none());
    }

    #[test]
    fn settled_roster_passes_check() {
        // Two players on the channel, two reported by the poller.
        let (dispatcher, _queue, _store) = setup(2, Some(2));
        assert_eq!(dispatcher.check_start(SyncPolicy::Require), Ok(2));
    }

    #[test]
    fn pending_sync_requires_override() {
        let (dispatcher, _queue, _store) = setup(1, Some(3));
        let err = dispatcher.check_start(SyncPolicy::Require).unwrap_err();
        assert_eq!(
            err,
            StartGameError::SyncPending {
                ready: 1,
                expected: 3
            }
        );
        assert!(err.is_overridable());
        assert_eq!(
            err.to_string(),
            "Player sync in progress (1/3 ready). Please wait a moment..."
        );
        assert_eq!(dispatcher.check_start(SyncPolicy::Override), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn start_game_waits_for_flush_delay() {
        let (dispatcher, queue, _store) = setup(2, Some(2));

        // Stand-in for the write pump: accept every frame immediately.
        let pump = tokio::spawn(async move {
            let mut sent = Vec::new();
            while let Some(out) = queue.lock().await.next().await {
                sent.push(out.command);
                let _ = out.accepted.send(());
            }
            sent
        });

        let started = tokio::time::Instant::now();
        let receipt = dispatcher.start_game(SyncPolicy::Require).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            receipt,
            StartReceipt {
                flushed: true,
                player_count: 2
            }
        );

        dispatcher.handle.close();
        assert_eq!(pump.await.unwrap(), vec![ClientCommand::StartGame]);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritten_frame_reports_not_flushed() {
        // Nobody drains the queue, as when the channel is reconnecting.
        let (dispatcher, _queue, _store) = setup(1, None);
        let receipt = dispatcher.start_game(SyncPolicy::Require).await.unwrap();
        assert!(!receipt.flushed);
    }

    #[tokio::test]
    async fn closed_handle_is_reported() {
        let (dispatcher, _queue, _store) = setup(2, None);
        dispatcher.handle.close();
        assert_eq!(
            dispatcher.start_game(SyncPolicy::Override).await,
            Err(StartGameError::Closed)
        );
    }
}
