//! Reconnect loop for the session push channel.
//!
//! The supervisor is the only writer of [`ConnectionState`]. It opens a
//! [`TransportChannel`], forwards decoded frames to the reconciler queue,
//! requests the roster once the channel has settled, and reconnects with
//! exponential backoff when the channel drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::channel::{TransportChannel, TransportEvent};
use super::connection::{ConnectionState, Connector, OutboundQueue, ReconnectConfig};
use crate::dispatcher::CommandDispatcher;
use crate::reconciler::SyncEvent;

/// How a connected session ended.
enum Drive {
    /// The channel dropped. `settled` is set when it stayed open past the
    /// settle delay.
    Closed { settled: bool },
    Cancelled,
}

pub struct ConnectionSupervisor {
    url: String,
    connector: Arc<dyn Connector>,
    outbound: OutboundQueue,
    state: Arc<watch::Sender<ConnectionState>>,
    sync_tx: mpsc::UnboundedSender<SyncEvent>,
    dispatcher: CommandDispatcher,
    reconnect: ReconnectConfig,
    settle_delay: Duration,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        url: String,
        connector: Arc<dyn Connector>,
        outbound: OutboundQueue,
        state: Arc<watch::Sender<ConnectionState>>,
        sync_tx: mpsc::UnboundedSender<SyncEvent>,
        dispatcher: CommandDispatcher,
        reconnect: ReconnectConfig,
        settle_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url,
            connector,
            outbound,
            state,
            sync_tx,
            dispatcher,
            reconnect,
            settle_delay,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn set_state(&self, next: ConnectionState) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                crate::log_debug!("Connection state {:?} -> {:?}", current, next);
                *current = next;
                true
            }
        });
    }

    async fn run(self) {
        // 0 is the initial connect; reconnect attempts count from 1.
        let mut attempt = 0u32;

        loop {
            if attempt == 0 {
                self.set_state(ConnectionState::Connecting);
            } else {
                self.set_state(ConnectionState::Reconnecting { attempt });
            }

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = TransportChannel::connect(
                    self.connector.as_ref(),
                    &self.url,
                    self.outbound.clone(),
                    &self.cancel,
                ) => result,
            };

            let next_attempt = match connected {
                Ok(channel) => {
                    self.set_state(ConnectionState::Connected);
                    crate::log_info!("Push channel connected to {}", self.url);
                    match self.drive(channel).await {
                        Drive::Cancelled => break,
                        Drive::Closed { settled: true } => 1,
                        Drive::Closed { settled: false } => {
                            crate::log_warn!(
                                "Push channel to {} closed before settling",
                                self.url
                            );
                            match self.next_attempt(attempt) {
                                Some(next) => next,
                                None => break,
                            }
                        }
                    }
                }
                Err(e) => {
                    crate::log_error!("Push channel error for {}: {}", self.url, e);
                    match self.next_attempt(attempt) {
                        Some(next) => next,
                        None => break,
                    }
                }
            };

            // Leave Connected before sleeping so polling resumes right away.
            self.set_state(ConnectionState::Reconnecting {
                attempt: next_attempt,
            });
            let delay = self.reconnect.delay_for_attempt(next_attempt);
            crate::log_info!(
                "Reconnecting to {} in {}ms (attempt {})",
                self.url,
                delay.as_millis(),
                next_attempt
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = next_attempt;
        }

        crate::log_debug!("Supervisor for {} stopped", self.url);
    }

    /// Attempt number after a failed `attempt`, or `None` once reconnects are
    /// used up. Going offline sets the terminal `Disconnected` state.
    fn next_attempt(&self, attempt: u32) -> Option<u32> {
        if self.reconnect.is_exhausted(attempt) {
            crate::log_error!(
                "Max reconnect attempts ({}) exceeded for {}, going offline",
                self.reconnect.max_attempts,
                self.url
            );
            self.set_state(ConnectionState::Disconnected);
            return None;
        }
        Some(attempt + 1)
    }

    /// Pump one connected channel until it closes or the client is torn down.
    async fn drive(&self, mut channel: TransportChannel) -> Drive {
        let settle = tokio::time::sleep(self.settle_delay);
        tokio::pin!(settle);
        let mut settled = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    channel.close();
                    return Drive::Cancelled;
                }
                _ = &mut settle, if !settled => {
                    settled = true;
                    self.dispatcher.request_roster();
                }
                event = channel.next_event() => match event {
                    Some(TransportEvent::Opened) => {
                        crate::log_debug!("Channel to {} opened", self.url);
                    }
                    Some(TransportEvent::Message(event)) => {
                        if self.sync_tx.send(SyncEvent::Channel(event)).is_err() {
                            return Drive::Cancelled;
                        }
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        crate::log_info!(
                            "Push channel to {} closed (code {:?}): {}",
                            self.url,
                            code,
                            reason
                        );
                        return Drive::Closed { settled };
                    }
                    Some(TransportEvent::Error(e)) => {
                        crate::log_warn!("Push channel to {} failed: {}", self.url, e);
                        return Drive::Closed { settled };
                    }
                    None => return Drive::Closed { settled },
                },
            }
        }
    }
}
