//! Wire messages exchanged between trackers, the relay, and receivers.
//!
//! Every message is one JSON document:
//!
//! - registration: `{"type":"tracker"|"trackerreceiver","id":<int>}`
//! - batch (tracker -> relay): `[{"id":<int>,"x":<float>,"y":<float>}, ...]`
//! - record (relay -> receiver): `{"id":<int>,"x":<float>,"y":<float>}`
//! - debug sentinel (relay -> every receiver): `{"id":-1,"x":-1,"y":-1}`

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One routed position: channel id plus zone-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerRecord {
    #[serde(rename = "id")]
    pub channel_id: i32,
    pub x: f32,
    pub y: f32,
}

/// Reserved record broadcast to toggle debug mode on receivers.
pub const DEBUG_SENTINEL: TrackerRecord = TrackerRecord {
    channel_id: -1,
    x: -1.0,
    y: -1.0,
};

impl TrackerRecord {
    pub fn new(channel_id: i32, x: f32, y: f32) -> Self {
        Self { channel_id, x, y }
    }

    pub fn is_debug_sentinel(&self) -> bool {
        *self == DEBUG_SENTINEL
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Produces record batches.
    #[serde(rename = "tracker")]
    Emitter,
    /// Consumes records for its own channel id.
    #[serde(rename = "trackerreceiver")]
    Subscriber,
}

impl Role {
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::Emitter => "tracker",
            Role::Subscriber => "trackerreceiver",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "type")]
    pub role: Role,
    pub id: i32,
}

/// A decoded inbound frame at the relay.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Register(Registration),
    Batch(Vec<TrackerRecord>),
}

/// Decode a relay-bound frame: registration first, then batch.
pub fn decode_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    if let Ok(reg) = serde_json::from_str::<Registration>(text) {
        return Ok(Inbound::Register(reg));
    }
    match serde_json::from_str::<Vec<TrackerRecord>>(text) {
        Ok(batch) => Ok(Inbound::Batch(batch)),
        Err(err) => Err(ProtocolError::Unrecognized(format!(
            "{} ({})",
            truncate(text, 64),
            err
        ))),
    }
}

/// Decode a single record as delivered to a receiver.
pub fn decode_record(text: &str) -> Result<TrackerRecord, ProtocolError> {
    serde_json::from_str(text)
        .map_err(|err| ProtocolError::Unrecognized(format!("{} ({})", truncate(text, 64), err)))
}

pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_uses_wire_names() {
        let reg = Registration {
            role: Role::Subscriber,
            id: 2,
        };
        let json = encode(&reg).unwrap();
        assert_eq!(json, r#"{"type":"trackerreceiver","id":2}"#);
        let json = encode(&Registration {
            role: Role::Emitter,
            id: 1,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"tracker","id":1}"#);
    }

    #[test]
    fn decodes_registration_before_batch() {
        let inbound = decode_inbound(r#"{"type":"tracker","id":4}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Register(Registration {
                role: Role::Emitter,
                id: 4
            })
        );
    }

    #[test]
    fn decodes_batch() {
        let inbound = decode_inbound(r#"[{"id":2,"x":0.4,"y":0.6},{"id":9,"x":0.1,"y":0.1}]"#)
            .unwrap();
        match inbound {
            Inbound::Batch(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0], TrackerRecord::new(2, 0.4, 0.6));
                assert_eq!(records[1].channel_id, 9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_batch_is_valid() {
        assert_eq!(decode_inbound("[]").unwrap(), Inbound::Batch(vec![]));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        for text in [
            r#"{"type":"viewer","id":1}"#,
            r#"{"id":2,"x":0.1,"y":0.2}"#,
            r#""hello""#,
            "not json",
        ] {
            let err = decode_inbound(text).unwrap_err();
            assert!(matches!(err, ProtocolError::Unrecognized(_)), "{text}");
        }
    }

    #[test]
    fn sentinel_accepts_integer_coordinates() {
        let record = decode_record(r#"{"id":-1,"x":-1,"y":-1}"#).unwrap();
        assert!(record.is_debug_sentinel());
        assert!(!TrackerRecord::new(-1, 0.0, -1.0).is_debug_sentinel());
    }

    #[test]
    fn record_round_trips_through_wire_name() {
        let json = encode(&TrackerRecord::new(2, 0.5, 0.25)).unwrap();
        assert_eq!(json, r#"{"id":2,"x":0.5,"y":0.25}"#);
    }
}
