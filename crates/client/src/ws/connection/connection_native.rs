//! Native push channel backend using tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, FrameSink, FrameStream, Inbound};
use crate::error::TransportError;

/// Opens WebSocket connections to the session server.
#[derive(Debug, Clone, Copy)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    /// Connector that gives up on a handshake after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "{url}: handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        crate::log_info!("WebSocket connected to {}", url);

        let (write, read) = ws_stream.split();

        let sink = write
            .with(|text: String| {
                future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(
                    Message::Text(text.into()),
                ))
            })
            .sink_map_err(|e| TransportError::Send(e.to_string()));

        let stream = read.filter_map(|msg_result| {
            future::ready(match msg_result {
                Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => Some(Ok(match frame {
                    Some(frame) => Inbound::Close {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => Inbound::Close {
                        code: None,
                        reason: String::new(),
                    },
                })),
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                    None
                }
                Ok(_) => {
                    // Ignore binary, pong, etc.
                    None
                }
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
