//! Socket plumbing shared by the relay and its clients.
//!
//! Provides relay endpoint parsing and the WebSocket text-message helpers
//! used on every connection.

mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::{
    close_gracefully, flush_pending, read_text, send_text, socket_config, Incoming,
    MAX_MESSAGE_BYTES,
};
