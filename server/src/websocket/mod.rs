//! WebSocket support for realtime document subscriptions.
//!
//! Clients subscribe to school paths and receive the current value after
//! every write, including their own.

mod manager;
mod protocol;

pub use manager::ConnectionManager;
pub use protocol::*;
