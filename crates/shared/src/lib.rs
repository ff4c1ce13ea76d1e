//! Shared types for the quizroom session client and any tooling that speaks
//! the session wire protocol.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
