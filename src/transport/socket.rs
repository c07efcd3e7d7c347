//! Text messages over a WebSocket that is polled with a read timeout.
//!
//! Every relay message is one JSON document in one text message. Sockets are
//! driven from a single thread each: reads time out after a short poll so the
//! same thread can also flush queued outbound messages and watch for shutdown.

use std::io::{self, Read, Write};
use tungstenite::error::ProtocolError;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Error, Message, WebSocket};

/// Largest accepted message or frame.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;
/// Unsent bytes a socket may hold before writes fail.
const MAX_WRITE_BUFFER: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// Nothing complete arrived before the read timeout, or a control frame.
    Idle,
    /// The peer closed or dropped the connection.
    Closed,
}

pub fn socket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_BYTES);
    config.max_frame_size = Some(MAX_MESSAGE_BYTES);
    config.max_write_buffer_size = MAX_WRITE_BUFFER;
    config
}

/// Read at most one message.
///
/// Partial frames stay buffered inside the socket across timeouts.
pub fn read_text<S: Read + Write>(socket: &mut WebSocket<S>) -> Result<Incoming, Error> {
    match socket.read() {
        Ok(Message::Text(text)) => Ok(Incoming::Text(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Ok(Incoming::Text(text)),
            Err(_) => {
                log::warn!("ignoring binary message that is not UTF-8");
                Ok(Incoming::Idle)
            }
        },
        Ok(Message::Close(_)) => Ok(Incoming::Closed),
        Ok(_) => Ok(Incoming::Idle),
        Err(Error::ConnectionClosed | Error::AlreadyClosed) => Ok(Incoming::Closed),
        Err(Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => Ok(Incoming::Closed),
        Err(Error::Io(err)) if is_timeout(&err) => Ok(Incoming::Idle),
        Err(err) => Err(err),
    }
}

/// Queue and flush one text message.
///
/// A write timeout leaves the message buffered for the next flush.
pub fn send_text<S: Read + Write>(socket: &mut WebSocket<S>, text: &str) -> Result<(), Error> {
    match socket.send(Message::Text(text.to_string())) {
        Err(Error::Io(err)) if is_timeout(&err) => Ok(()),
        other => other,
    }
}

/// Push out anything still buffered from an earlier timed-out write.
pub fn flush_pending<S: Read + Write>(socket: &mut WebSocket<S>) -> Result<(), Error> {
    match socket.flush() {
        Err(Error::Io(err)) if is_timeout(&err) => Ok(()),
        other => other,
    }
}

/// Best-effort close handshake.
pub fn close_gracefully<S: Read + Write>(socket: &mut WebSocket<S>) {
    let _ = socket.close(None);
    let _ = socket.flush();
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
