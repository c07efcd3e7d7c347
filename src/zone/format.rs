//! On-disk zone file format.
//!
//! The file is a JSON array; only zones with at least one vertex are written:
//!
//! ```json
//! [
//!   {
//!     "id": 0,
//!     "customId": 7,
//!     "points": [{"x": 0.1, "y": 0.1}, {"x": 0.5, "y": 0.1}, {"x": 0.5, "y": 0.5}, {"x": 0.1, "y": 0.5}],
//!     "normalizedRect": {"x": 0.1, "y": 0.1, "width": 0.4, "height": 0.4}
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ZoneError;
use crate::geometry::{Point, Rect};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedZone {
    pub id: usize,
    pub custom_id: i32,
    pub points: Vec<Point>,
    pub normalized_rect: Rect,
}

/// Decode a zone file. Anything other than a JSON array of zones is an error.
pub fn decode_zones(json: &str) -> Result<Vec<PersistedZone>, ZoneError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_array() {
        return Err(ZoneError::Json(serde::de::Error::custom(
            "expected a JSON array of zones",
        )));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn encode_zones(zones: &[PersistedZone]) -> Result<String, ZoneError> {
    Ok(serde_json::to_string_pretty(zones)?)
}
