//! Request handlers shared by the HTTP and WebSocket surfaces.

mod documents;
mod websocket;

pub use documents::*;
pub use websocket::*;
