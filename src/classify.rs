//! Zone classification of detections.

use crate::geometry::Point;
use crate::protocol::TrackerRecord;
use crate::zone::{Zone, ZoneStore};

/// Records for one detection: one per routable zone whose polygon contains it.
///
/// Coordinates are the detection's position inside the zone's bounding rect
/// and are not clamped.
pub fn classify(point: Point, zones: &[Zone]) -> Vec<TrackerRecord> {
    zones
        .iter()
        .filter(|zone| zone.is_routable() && zone.contains(point))
        .map(|zone| {
            let local = zone.localize(point);
            TrackerRecord::new(zone.custom_id(), local.x, local.y)
        })
        .collect()
}

/// Records for a whole frame, in detection order.
pub fn classify_frame(points: &[Point], store: &ZoneStore) -> Vec<TrackerRecord> {
    points
        .iter()
        .flat_map(|p| classify(*p, store.zones()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> [Point; 4] {
        [
            Point::new(0.1, 0.1),
            Point::new(0.5, 0.1),
            Point::new(0.5, 0.5),
            Point::new(0.1, 0.5),
        ]
    }

    fn store_with_square(custom_id: i32) -> ZoneStore {
        let mut store = ZoneStore::in_memory(4);
        store.define_zone(custom_id, square()).unwrap();
        store
    }

    #[test]
    fn point_inside_square_maps_to_local_center() {
        let store = store_with_square(7);
        let records = classify(Point::new(0.3, 0.3), store.zones());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel_id, 7);
        assert!((records[0].x - 0.5).abs() < 1e-6);
        assert!((records[0].y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn point_outside_yields_nothing() {
        let store = store_with_square(7);
        assert!(classify(Point::new(0.9, 0.9), store.zones()).is_empty());
    }

    #[test]
    fn unassigned_zone_is_ignored() {
        let mut store = ZoneStore::in_memory(2);
        for p in square() {
            store.set_vertex(0, p).unwrap();
        }
        assert!(classify(Point::new(0.3, 0.3), store.zones()).is_empty());
    }

    #[test]
    fn incomplete_zone_is_ignored() {
        let mut store = ZoneStore::in_memory(2);
        for p in &square()[..3] {
            store.set_vertex(0, *p).unwrap();
        }
        store.assign_custom_id(0, 3).unwrap();
        assert!(classify(Point::new(0.3, 0.2), store.zones()).is_empty());
    }

    #[test]
    fn degenerate_zone_is_ignored() {
        let mut store = ZoneStore::in_memory(1);
        let line = [
            Point::new(0.1, 0.2),
            Point::new(0.5, 0.2),
            Point::new(0.5, 0.2),
            Point::new(0.1, 0.2),
        ];
        store.define_zone(1, line).unwrap();
        assert!(classify(Point::new(0.3, 0.2), store.zones()).is_empty());
    }

    #[test]
    fn overlapping_zones_each_report() {
        let mut store = store_with_square(1);
        store
            .define_zone(
                2,
                [
                    Point::new(0.2, 0.2),
                    Point::new(0.6, 0.2),
                    Point::new(0.6, 0.6),
                    Point::new(0.2, 0.6),
                ],
            )
            .unwrap();
        let records = classify(Point::new(0.3, 0.3), store.zones());
        let channels: Vec<i32> = records.iter().map(|r| r.channel_id).collect();
        assert_eq!(channels, vec![1, 2]);
    }

    #[test]
    fn shared_channel_reports_from_each_zone() {
        let mut store = store_with_square(5);
        store.define_zone(5, square()).unwrap();
        assert_eq!(classify(Point::new(0.3, 0.3), store.zones()).len(), 2);
    }

    #[test]
    fn polygon_contained_points_stay_in_unit_range() {
        let mut store = ZoneStore::in_memory(1);
        store
            .define_zone(
                9,
                [
                    Point::new(0.3, 0.1),
                    Point::new(0.9, 0.3),
                    Point::new(0.7, 0.9),
                    Point::new(0.1, 0.7),
                ],
            )
            .unwrap();
        for i in 0..=20 {
            for j in 0..=20 {
                let p = Point::new(i as f32 / 20.0, j as f32 / 20.0);
                for r in classify(p, store.zones()) {
                    assert!((-1e-5..=1.0 + 1e-5).contains(&r.x), "{p:?} -> {r:?}");
                    assert!((-1e-5..=1.0 + 1e-5).contains(&r.y), "{p:?} -> {r:?}");
                }
            }
        }
    }

    #[test]
    fn classification_is_repeatable() {
        let store = store_with_square(7);
        let p = Point::new(0.1, 0.3);
        let first = classify(p, store.zones());
        for _ in 0..10 {
            assert_eq!(classify(p, store.zones()), first);
        }
    }

    #[test]
    fn frame_concatenates_in_detection_order() {
        let mut store = store_with_square(1);
        store
            .define_zone(
                2,
                [
                    Point::new(0.6, 0.6),
                    Point::new(0.9, 0.6),
                    Point::new(0.9, 0.9),
                    Point::new(0.6, 0.9),
                ],
            )
            .unwrap();
        let frame = [
            Point::new(0.75, 0.75),
            Point::new(0.95, 0.05),
            Point::new(0.3, 0.3),
        ];
        let channels: Vec<i32> = classify_frame(&frame, &store)
            .iter()
            .map(|r| r.channel_id)
            .collect();
        assert_eq!(channels, vec![2, 1]);
        assert!(classify_frame(&[], &store).is_empty());
    }
}
