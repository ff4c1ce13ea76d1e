//! One live push connection and its read/write pumps.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quizroom_shared::{decode_server_frame, encode_client_command, ServerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::{Connector, FrameSink, FrameStream, Inbound, OutboundQueue};
use crate::error::TransportError;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle events of a transport channel, delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(ServerEvent),
    Closed { code: Option<u16>, reason: String },
    Error(TransportError),
}

/// An open push connection. Dropping it closes the connection.
pub struct TransportChannel {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
}

impl TransportChannel {
    /// Open a connection and start pumping frames. The first event is always
    /// [`TransportEvent::Opened`].
    pub(crate) async fn connect(
        connector: &dyn Connector,
        url: &str,
        outbound: OutboundQueue,
        parent: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let (sink, stream) = connector.connect(url).await?;

        let cancel = parent.child_token();
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = events_tx.send(TransportEvent::Opened);

        tokio::spawn(read_pump(stream, events_tx.clone(), cancel.clone()));
        tokio::spawn(write_pump(sink, outbound, events_tx, cancel.clone()));

        Ok(Self { events, cancel })
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_pump(
    mut stream: FrameStream,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(Inbound::Text(text))) => match decode_server_frame(&text) {
                Ok(ServerEvent::Unknown) => {
                    crate::log_warn!("Dropping frame with unknown type: {}", text);
                    continue;
                }
                Ok(event) => TransportEvent::Message(event),
                Err(e) => {
                    crate::log_warn!("Dropping {}: {}", e, text);
                    continue;
                }
            },
            Some(Ok(Inbound::Close { code, reason })) => {
                let _ = events.send(TransportEvent::Closed { code, reason });
                return;
            }
            Some(Err(e)) => {
                crate::log_error!("WebSocket read error: {}", e);
                let _ = events.send(TransportEvent::Error(e));
                return;
            }
            None => {
                let _ = events.send(TransportEvent::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                });
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

async fn write_pump(
    mut sink: FrameSink,
    outbound: OutboundQueue,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { outbound.lock().await.next().await } => next,
        };

        let Some(out) = next else {
            crate::log_info!("Outbound queue closed, stopping write task");
            break;
        };

        let json = match encode_client_command(&out.command) {
            Ok(json) => json,
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                continue;
            }
        };

        crate::log_debug!("Sending {}", json);
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(json) => sent,
        };
        match sent {
            Ok(()) => {
                let _ = out.accepted.send(());
            }
            Err(e) => {
                crate::log_error!("Send failed: {}", e);
                let _ = events.send(TransportEvent::Error(e));
                return;
            }
        }
    }

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
}
