//! Push channel for real-time session updates.
//!
//! This module provides:
//! - The transport channel (one socket connection and its read/write pumps)
//! - The connection supervisor (reconnect with backoff, settle-delayed roster request)
//! - Frame forwarding into the reconciler queue (readers use the store, not events)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               ConnectionSupervisor                  │
//! │  (owns ConnectionState, reconnects with backoff)    │
//! └─────────────────────────────────────────────────────┘
//!                         │ connect()
//!                         ▼
//!              ┌─────────────────────┐        ┌──────────────┐
//!              │  TransportChannel   │◄───────│  WsHandle    │
//!              │ (read + write pump) │ queue  │ (dispatcher) │
//!              └─────────────────────┘        └──────────────┘
//!                         │ TransportEvent::Message
//!                         ▼
//!              ┌─────────────────────┐        ┌──────────────┐
//!              │     Reconciler      │◄───────│    Poller    │
//!              └─────────────────────┘        └──────────────┘
//!                         │ single writer
//!                         ▼
//!              ┌─────────────────────┐
//!              │  SessionStateStore  │ ──► readers (watch)
//!              └─────────────────────┘
//! ```

mod channel;
mod connection;
mod supervisor;

pub use channel::{TransportChannel, TransportEvent};
pub use connection::{
    ConnectionState, Connector, Delivery, FrameSink, FrameStream, Inbound, ReconnectConfig,
    TungsteniteConnector, WsHandle,
};
pub use supervisor::ConnectionSupervisor;

pub(crate) use connection::outbound_queue;
#[cfg(test)]
pub(crate) use connection::OutboundQueue;
