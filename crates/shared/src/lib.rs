//! Shared types for the contest-live client and anything that speaks its hub protocol.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
