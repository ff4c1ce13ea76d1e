//! Periodic status pulls, used while the push channel can't be trusted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quizroom_shared::{ApiError, GameStatus, SessionCode};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollMode;
use crate::reconciler::SyncEvent;
use crate::ws::ConnectionState;

/// Where the poller reads session status from.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch_status(&self, code: &SessionCode) -> Result<GameStatus, ApiError>;
}

pub struct Poller {
    code: SessionCode,
    source: Arc<dyn StatusSource>,
    connection: watch::Receiver<ConnectionState>,
    mode: PollMode,
    interval: Duration,
    sync_tx: mpsc::UnboundedSender<SyncEvent>,
    active: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        code: SessionCode,
        source: Arc<dyn StatusSource>,
        connection: watch::Receiver<ConnectionState>,
        mode: PollMode,
        interval: Duration,
        sync_tx: mpsc::UnboundedSender<SyncEvent>,
        active: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            code,
            source,
            connection,
            mode,
            interval,
            sync_tx,
            active,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn set_active(&self, active: bool) {
        let previous = self.active.send_replace(active);
        if previous != active {
            let _ = self.sync_tx.send(SyncEvent::PollerActive(active));
            crate::log_debug!(
                "Status polling for session {} {}",
                self.code,
                if active { "started" } else { "stopped" }
            );
        }
    }

    async fn run(mut self) {
        let mode = self.mode;

        loop {
            // Idle until the connection state calls for polling.
            let woke = tokio::select! {
                _ = self.cancel.cancelled() => break,
                state = self.connection.wait_for(|state| mode.should_poll(state)) => state.is_ok(),
            };
            if !woke {
                break;
            }

            self.set_active(true);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        self.set_active(false);
                        return;
                    }
                    changed = self.connection.changed() => {
                        if changed.is_err() {
                            self.set_active(false);
                            return;
                        }
                        if !mode.should_poll(&self.connection.borrow_and_update()) {
                            break;
                        }
                    }
                    _ = ticker.tick() => self.poll_once().await,
                }
            }

            self.set_active(false);
        }

        self.set_active(false);
    }

    async fn poll_once(&self) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.source.fetch_status(&self.code) => result,
        };

        match result {
            Ok(status) => {
                crate::log_debug!(
                    "Polled session {}: {:?}, {} players",
                    self.code,
                    status.game_state,
                    status.total_players()
                );
                let _ = self.sync_tx.send(SyncEvent::Polled(status));
            }
            Err(e) => {
                crate::log_warn!("Status poll for session {} failed: {}", self.code, e.summary());
            }
        }
    }
}
