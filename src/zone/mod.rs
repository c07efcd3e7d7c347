//! Zone store: fixed-capacity quadrilateral zones bound to channel ids.
//!
//! A zone is either empty (no vertices) or complete (exactly four vertices
//! plus the bounding rect derived from them). While a zone is being defined
//! it may briefly hold one to three vertices; such zones never classify and
//! are discarded when the file is reloaded.
//!
//! Slot `i` always holds the zone with `id == i`.

pub mod format;

use std::path::{Path, PathBuf};

use crate::error::ZoneError;
use crate::geometry::{point_in_polygon, Point, Rect};
use format::PersistedZone;

/// Number of vertices in a complete zone.
pub const ZONE_VERTICES: usize = 4;

/// `custom_id` of a zone that has not been bound to a channel.
pub const UNASSIGNED: i32 = -1;

/// Default number of zone slots per tracker.
pub const DEFAULT_CAPACITY: usize = 4;

/// Identity color of a zone, derived from its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneColor {
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
}

pub const PALETTE: [ZoneColor; 6] = [
    ZoneColor::Red,
    ZoneColor::Green,
    ZoneColor::Blue,
    ZoneColor::Yellow,
    ZoneColor::Cyan,
    ZoneColor::Magenta,
];

impl ZoneColor {
    pub fn for_id(id: usize) -> Self {
        PALETTE[id % PALETTE.len()]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    id: usize,
    custom_id: i32,
    vertices: Vec<Point>,
    bounding_rect: Rect,
    color: ZoneColor,
}

impl Zone {
    pub fn empty(id: usize) -> Self {
        Self {
            id,
            custom_id: UNASSIGNED,
            vertices: Vec::with_capacity(ZONE_VERTICES),
            bounding_rect: Rect::default(),
            color: ZoneColor::for_id(id),
        }
    }

    fn from_persisted(p: PersistedZone) -> Self {
        Self {
            id: p.id,
            custom_id: p.custom_id,
            vertices: p.points,
            bounding_rect: p.normalized_rect,
            color: ZoneColor::for_id(p.id),
        }
    }

    fn to_persisted(&self) -> PersistedZone {
        PersistedZone {
            id: self.id,
            custom_id: self.custom_id,
            points: self.vertices.clone(),
            normalized_rect: self.bounding_rect,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn custom_id(&self) -> i32 {
        self.custom_id
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn bounding_rect(&self) -> Rect {
        self.bounding_rect
    }

    pub fn color(&self) -> ZoneColor {
        self.color
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.vertices.len() == ZONE_VERTICES
    }

    /// Complete, non-degenerate and bound to a channel.
    pub fn is_routable(&self) -> bool {
        self.is_complete() && !self.bounding_rect.is_degenerate() && self.custom_id != UNASSIGNED
    }

    pub fn contains(&self, point: Point) -> bool {
        point_in_polygon(point, &self.vertices)
    }

    /// Position of `point` inside this zone's bounding rect, unclamped.
    pub fn localize(&self, point: Point) -> Point {
        self.bounding_rect.localize(point)
    }

    fn reset(&mut self) {
        self.vertices.clear();
        self.custom_id = UNASSIGNED;
        self.bounding_rect = Rect::default();
    }
}

/// Result of placing one vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexProgress {
    /// The zone now holds `placed` of its four vertices.
    Pending { placed: usize },
    /// The fourth vertex was placed and the bounding rect computed.
    Complete,
}

/// Where the zones of a freshly loaded store came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// No zone file existed; all slots are empty.
    Fresh,
    /// Zones were restored from the file.
    Restored { zones: usize },
    /// The file existed but could not be used; all slots are empty.
    Recovered { reason: String },
}

#[derive(Clone, Debug)]
pub struct ZoneStore {
    zones: Vec<Zone>,
    path: Option<PathBuf>,
}

impl ZoneStore {
    /// Store with `capacity` empty zones and no backing file.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            zones: empty_zones(capacity),
            path: None,
        }
    }

    /// Load the zone file at `path`, falling back to empty zones when it is
    /// missing or unusable. Never fails.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> (Self, LoadSource) {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::error!("failed to read zone file {}: {}", path.display(), err);
                let store = Self {
                    zones: empty_zones(capacity),
                    path: Some(path),
                };
                return (
                    store,
                    LoadSource::Recovered {
                        reason: err.to_string(),
                    },
                );
            }
        };
        let (zones, source) = Self::zones_from_json(raw.as_deref(), capacity);
        match &source {
            LoadSource::Fresh => log::info!(
                "no zone file at {}; initialized {} empty zones",
                path.display(),
                capacity
            ),
            LoadSource::Restored { zones } => {
                log::info!("restored {} zones from {}", zones, path.display())
            }
            LoadSource::Recovered { reason } => log::error!(
                "invalid zone file {}: {}; starting with empty zones",
                path.display(),
                reason
            ),
        }
        (
            Self {
                zones,
                path: Some(path),
            },
            source,
        )
    }

    /// Build the slot table from an optional zone file payload.
    pub fn from_json(raw: Option<&str>, capacity: usize) -> (Self, LoadSource) {
        let (zones, source) = Self::zones_from_json(raw, capacity);
        (Self { zones, path: None }, source)
    }

    fn zones_from_json(raw: Option<&str>, capacity: usize) -> (Vec<Zone>, LoadSource) {
        let Some(raw) = raw else {
            return (empty_zones(capacity), LoadSource::Fresh);
        };
        let persisted = match format::decode_zones(raw) {
            Ok(persisted) => persisted,
            Err(err) => {
                return (
                    empty_zones(capacity),
                    LoadSource::Recovered {
                        reason: err.to_string(),
                    },
                )
            }
        };

        let mut slots: Vec<Option<Zone>> = vec![None; capacity];
        let mut restored = 0;
        for p in persisted {
            if p.points.is_empty() || p.points.len() > ZONE_VERTICES {
                log::warn!(
                    "skipping zone {}: {} vertices persisted",
                    p.id,
                    p.points.len()
                );
                continue;
            }
            let Some(slot) = slots.get_mut(p.id) else {
                log::warn!("skipping zone {}: beyond capacity {}", p.id, capacity);
                continue;
            };
            if slot.is_some() {
                log::warn!("skipping duplicate zone id {}", p.id);
                continue;
            }
            if p.points.len() < ZONE_VERTICES {
                log::info!(
                    "restored zone {} in progress with {} of {} vertices",
                    p.id,
                    p.points.len(),
                    ZONE_VERTICES
                );
            } else {
                log::debug!("restored zone id={} custom_id={}", p.id, p.custom_id);
            }
            *slot = Some(Zone::from_persisted(p));
            restored += 1;
        }

        let zones = slots
            .into_iter()
            .enumerate()
            .map(|(id, zone)| zone.unwrap_or_else(|| Zone::empty(id)))
            .collect();
        (zones, LoadSource::Restored { zones: restored })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.zones.len()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn complete_count(&self) -> usize {
        self.zones.iter().filter(|z| z.is_complete()).count()
    }

    /// Serialize the non-empty zones in id order.
    pub fn to_json(&self) -> Result<String, ZoneError> {
        let persisted: Vec<PersistedZone> = self
            .zones
            .iter()
            .filter(|z| !z.is_empty())
            .map(Zone::to_persisted)
            .collect();
        format::encode_zones(&persisted)
    }

    /// Write the zone file. A store without a backing file has nothing to do.
    pub fn save(&self) -> Result<(), ZoneError> {
        let Some(path) = &self.path else {
            log::debug!("zone store has no backing file; skipping save");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("zones saved to {}", path.display());
        Ok(())
    }

    /// Append a vertex to the zone at `index`.
    pub fn set_vertex(&mut self, index: usize, point: Point) -> Result<VertexProgress, ZoneError> {
        let zone = self.zone_mut(index)?;
        if zone.vertices.len() >= ZONE_VERTICES {
            return Err(ZoneError::CapacityExceeded { index });
        }
        zone.vertices.push(point);
        if zone.vertices.len() < ZONE_VERTICES {
            return Ok(VertexProgress::Pending {
                placed: zone.vertices.len(),
            });
        }
        zone.bounding_rect = Rect::envelope(&zone.vertices);
        log::info!("zone {} complete: {:?}", index, zone.bounding_rect);
        Ok(VertexProgress::Complete)
    }

    /// Bind the zone at `index` to a channel.
    pub fn assign_custom_id(&mut self, index: usize, custom_id: i32) -> Result<(), ZoneError> {
        let zone = self.zone_mut(index)?;
        zone.custom_id = custom_id;
        log::info!("zone {} assigned custom_id {}", index, custom_id);
        Ok(())
    }

    /// Reset the zone at `index` to empty and unassigned.
    pub fn clear(&mut self, index: usize) -> Result<(), ZoneError> {
        self.zone_mut(index)?.reset();
        log::info!("zone {} cleared", index);
        Ok(())
    }

    /// First slot with no vertices, in id order.
    pub fn next_empty_slot(&self) -> Option<usize> {
        self.zones.iter().position(Zone::is_empty)
    }

    /// Slot to use for a new zone, or `StoreFull`.
    pub fn begin_zone(&self) -> Result<usize, ZoneError> {
        self.next_empty_slot().ok_or(ZoneError::StoreFull {
            capacity: self.capacity(),
        })
    }

    /// Fill the next empty slot with `corners` and bind it to `custom_id`.
    pub fn define_zone(
        &mut self,
        custom_id: i32,
        corners: [Point; ZONE_VERTICES],
    ) -> Result<usize, ZoneError> {
        let index = self.begin_zone()?;
        for corner in corners {
            self.set_vertex(index, corner)?;
        }
        self.assign_custom_id(index, custom_id)?;
        Ok(index)
    }

    /// First complete zone whose polygon contains `point`.
    pub fn zone_at(&self, point: Point) -> Option<usize> {
        self.zones
            .iter()
            .position(|z| z.is_complete() && z.contains(point))
    }

    fn zone_mut(&mut self, index: usize) -> Result<&mut Zone, ZoneError> {
        let capacity = self.zones.len();
        self.zones
            .get_mut(index)
            .ok_or(ZoneError::NoSuchZone { index, capacity })
    }
}

fn empty_zones(capacity: usize) -> Vec<Zone> {
    (0..capacity).map(Zone::empty).collect()
}
