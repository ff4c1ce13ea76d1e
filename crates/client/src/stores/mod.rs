//! Reconciled session state.

pub mod session;

pub use session::{SessionState, SessionStateStore, StoreReader, SyncState};
