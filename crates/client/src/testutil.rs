//! In-memory doubles for the push channel and the status endpoint.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{sink, stream};
use quizroom_shared::{ApiError, ClientCommand, GameStatus, ServerEvent, SessionCode};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::poller::StatusSource;
use crate::ws::{Connector, FrameSink, FrameStream, Inbound};

struct ConnectorState {
    peers: mpsc::UnboundedSender<MockPeer>,
    fail_next: AtomicU32,
    refusing: AtomicBool,
    attempts: AtomicU32,
}

/// Connector whose connections terminate in a [`MockServer`].
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

/// Accepts connections opened through a [`MockConnector`].
pub struct MockServer {
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

impl MockConnector {
    pub fn new() -> (Self, MockServer) {
        let (peers_tx, peers) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(ConnectorState {
                peers: peers_tx,
                fail_next: AtomicU32::new(0),
                refusing: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
            }),
        };
        (connector, MockServer { peers })
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Refuse every connection attempt until called with `false`.
    pub fn set_refusing(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connection attempts so far, successful or not.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    fn should_refuse(&self) -> bool {
        if self.state.refusing.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_refuse() {
            return Err(TransportError::Connect(format!("{url}: connection refused")));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Inbound, TransportError>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();

        let frames = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let writer = sink::unfold(outbound_tx, |tx, frame: String| async move {
            match tx.send(frame) {
                Ok(()) => Ok(tx),
                Err(_) => Err(TransportError::Send("peer went away".to_string())),
            }
        });

        let peer = MockPeer {
            url: url.to_string(),
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        self.state
            .peers
            .send(peer)
            .map_err(|_| TransportError::Connect(format!("{url}: no mock server")))?;

        Ok((Box::pin(writer), Box::pin(frames)))
    }
}

impl MockServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MockPeer> {
        self.peers.recv().await
    }
}

/// Server side of one mock connection. Dropping it ends the client's stream.
pub struct MockPeer {
    pub url: String,
    inbound: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Inbound::Text(text.to_string())));
    }

    pub fn send_event(&self, event: &ServerEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            self.send_text(&text);
        }
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(Ok(Inbound::Close {
            code: Some(code),
            reason: reason.to_string(),
        }));
    }

    /// Fail the client's read side.
    pub fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .send(Err(TransportError::Receive(message.to_string())));
    }

    /// Next command the client wrote, or `None` once its writer is gone.
    pub async fn next_command(&mut self) -> Option<ClientCommand> {
        let text = self.outbound.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Commands written so far, without waiting.
    pub fn try_commands(&mut self) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            if let Ok(command) = serde_json::from_str(&text) {
                commands.push(command);
            }
        }
        commands
    }
}

struct FakeStatus {
    result: Result<GameStatus, ApiError>,
    calls: usize,
}

/// Status source returning a canned result.
#[derive(Clone)]
pub struct FakeStatusSource {
    inner: Arc<Mutex<FakeStatus>>,
}

impl FakeStatusSource {
    pub fn new(status: GameStatus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeStatus {
                result: Ok(status),
                calls: 0,
            })),
        }
    }

    pub fn set_status(&self, status: GameStatus) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.result = Ok(status);
        }
    }

    pub fn fail_with(&self, error: ApiError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.result = Err(error);
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().map(|inner| inner.calls).unwrap_or(0)
    }
}

#[async_trait]
impl StatusSource for FakeStatusSource {
    async fn fetch_status(&self, _code: &SessionCode) -> Result<GameStatus, ApiError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ApiError::Network("status source poisoned".to_string()))?;
        inner.calls += 1;
        inner.result.clone()
    }
}
