//! Tracker Relay
//!
//! Maps overhead-camera detections into user-defined zones and streams the
//! zone-local coordinates to remote receivers through a single relay,
//! keyed by integer channel id.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! detections → [`classify`] (using a [`ZoneStore`]) → record batch →
//! [`ChannelClient`] (tracker) → [`server`] / [`FrameRouter`] →
//! [`ChannelClient`] (receiver) → local listener.
//!
//! Delivery is at-most-once and latest-state: a frame produced while a
//! tracker is disconnected is skipped, and records for a channel with no
//! connected receiver are dropped.
//!
//! # Module Structure
//!
//! - `geometry`: points, rects, point-in-polygon, inverse lerp
//! - `zone`: zone slots, editing, JSON persistence
//! - `classify`: detection → per-zone records
//! - `protocol`: wire messages
//! - `transport`: `ws://` endpoints and WebSocket text messages
//! - `router`: id-keyed routing tables (no I/O)
//! - `server`: WebSocket relay around the router
//! - `client`: reconnecting tracker/receiver connection
//! - `emitter`: zone store + client for the tracker process
//! - `config`: file and environment settings for the binaries

pub mod classify;
pub mod client;
pub mod config;
pub mod emitter;
pub mod error;
pub mod geometry;
pub mod protocol;
pub mod router;
pub mod server;
pub mod transport;
pub mod zone;

pub use classify::{classify, classify_frame};
pub use client::{
    interpret_record, ChannelClient, ClientConfig, ClientEvent, ConnectionState, TrackerListener,
};
pub use emitter::{FrameOutcome, TrackerEmitter};
pub use error::{ProtocolError, ZoneError};
pub use geometry::{Point, Rect};
pub use protocol::{Registration, Role, TrackerRecord, DEBUG_SENTINEL};
pub use router::{ConnectionId, FrameRouter, RouteReport};
pub use server::{RelayConfig, RelayHandle, RelayServer, RelayStats};
pub use zone::{LoadSource, Zone, ZoneStore};
