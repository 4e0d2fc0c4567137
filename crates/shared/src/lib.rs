//! Shared wire types and error taxonomy for the chatline realtime client.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
