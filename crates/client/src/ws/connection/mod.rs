//! Push channel connection types.
//!
//! This module provides the shared types and the socket backend used in
//! production. The backend sits behind [`Connector`] so the supervisor and
//! the pumps never touch a concrete socket type.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::{Sink, Stream};
use quizroom_shared::ClientCommand;
use tokio::sync::{oneshot, Mutex};

use crate::error::TransportError;

/// Connection state of the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts are exhausted, or the client was torn down.
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    /// Persistent offline signal for collaborators.
    pub fn is_offline(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * f64::from(self.backoff_multiplier).powi(exponent);
        let capped = if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };
        Duration::from_millis(capped)
    }

    /// Whether a failure on reconnect attempt `attempt` ends the retry loop.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// One queued outbound command, with the acknowledgement fired once the
/// socket sink has accepted it.
pub(crate) struct Outbound {
    pub command: ClientCommand,
    pub accepted: oneshot::Sender<()>,
}

/// Receiving half of the outbound queue. Shared across reconnects so frames
/// queued while disconnected go out on the next connection.
pub(crate) type OutboundQueue = Arc<Mutex<UnboundedReceiver<Outbound>>>;

pub(crate) fn outbound_queue() -> (UnboundedSender<Outbound>, OutboundQueue) {
    let (tx, rx) = futures_channel::mpsc::unbounded();
    (tx, Arc::new(Mutex::new(rx)))
}

/// Resolves once the transport has accepted a queued frame.
pub struct Delivery {
    accepted: oneshot::Receiver<()>,
}

impl Delivery {
    /// Wait until the frame has been written to the socket. Fails if the
    /// frame was dropped (connection lost while sending, or teardown).
    pub async fn accepted(self) -> Result<(), TransportError> {
        self.accepted.await.map_err(|_| TransportError::Closed)
    }
}

/// Handle for sending commands through the push channel
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<Outbound>,
    pub session: String,
}

impl WsHandle {
    pub(crate) fn new(sender: UnboundedSender<Outbound>, session: String) -> Self {
        Self { sender, session }
    }

    /// Queue a command without waiting for it to be written.
    pub fn enqueue(&self, command: ClientCommand) -> Result<Delivery, TransportError> {
        crate::log_debug!("WsHandle::enqueue for session '{}': {:?}", self.session, command);
        let (accepted_tx, accepted_rx) = oneshot::channel();
        self.sender
            .unbounded_send(Outbound {
                command,
                accepted: accepted_tx,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(Delivery {
            accepted: accepted_rx,
        })
    }

    /// Queue a command and wait until the transport has accepted it.
    pub async fn send(&self, command: ClientCommand) -> Result<(), TransportError> {
        self.enqueue(command)?.accepted().await
    }

    /// Close the queue. Later sends fail and queued frames are dropped.
    pub(crate) fn close(&self) {
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A frame read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close { code: Option<u16>, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound, TransportError>> + Send>>;

/// Opens push connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

mod connection_native;
pub use connection_native::TungsteniteConnector;
