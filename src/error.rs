use thiserror::Error;

/// Failures surfaced by zone editing and persistence.
#[derive(Error, Debug)]
pub enum ZoneError {
    /// The zone already has its four vertices; it must be cleared first.
    #[error("zone {index} already has 4 vertices")]
    CapacityExceeded { index: usize },

    /// Every slot holds a zone; no new zone can be started.
    #[error("all {capacity} zone slots are in use")]
    StoreFull { capacity: usize },

    #[error("zone index {index} out of range (capacity {capacity})")]
    NoSuchZone { index: usize, capacity: usize },

    #[error("zone file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("zone file encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures decoding or encoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is neither a registration nor a record batch.
    #[error("unrecognized message: {0}")]
    Unrecognized(String),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
