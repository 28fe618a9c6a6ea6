//! Bridge region extraction (E, §4.2). Groups the bridge-infill segments of a layer into
//! connected regions, turns each into a polygon, and derives the anchor boundary the arc
//! planner will center its first arc on.

use geo::{BoundingRect, EuclideanDistance, MultiPolygon};

use crate::config::Configuration;
use crate::error::PlannerError;
use crate::geometry::{self, PolygonOperations};
use crate::model::{AmbientState, BridgeRegion, Layer, Pt, Segment, SegmentKind};

/// Groups a layer's bridge-infill segments into disjoint regions and validates each against
/// the size thresholds of §4.2, returning only the regions worth planning.
///
/// `previous_perimeter` is the outer-perimeter footprint of the layer below, which bridge
/// regions anchor on; layer 0 has none, so no region in it can ever have an anchor and the
/// function returns an empty vector.
pub fn extract_bridge_regions(
    layer: &Layer,
    previous_perimeter: &MultiPolygon<f64>,
    config: &Configuration,
) -> Vec<Result<BridgeRegion, PlannerError>> {
    if previous_perimeter.0.is_empty() {
        return Vec::new();
    }

    let bridge_segments: Vec<&Segment> = layer
        .segments
        .iter()
        .filter(|s| s.kind == SegmentKind::BridgeInfill)
        .collect();

    if bridge_segments.is_empty() {
        return Vec::new();
    }

    group_by_adjacency(&bridge_segments)
        .into_iter()
        .map(|group| build_region(layer.index, &group, previous_perimeter, config))
        .collect()
}

/// Union-find over bridge segments: two segments are in the same region if any endpoint of
/// one lies within `arc_width` of the other's path (i.e. they would merge once buffered).
fn group_by_adjacency<'a>(segments: &[&'a Segment]) -> Vec<Vec<&'a Segment>> {
    let n = segments.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        if parent[i] != i {
            parent[i] = find(parent, parent[i]);
        }
        parent[i]
    }

    fn union(parent: &mut [usize], a: usize, b: usize) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[ra] = rb;
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if segments_touch(segments[i], segments[j]) {
                union(&mut parent, i, j);
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<&Segment>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(segments[i]);
    }

    groups.into_values().collect()
}

fn segments_touch(a: &Segment, b: &Segment) -> bool {
    a.path.euclidean_distance(&b.path) < 1e-3
}

fn build_region(
    layer_index: usize,
    group: &[&Segment],
    previous_perimeter: &MultiPolygon<f64>,
    config: &Configuration,
) -> Result<BridgeRegion, PlannerError> {
    let half_width = config.arc_width / 2.0;

    let mut footprint = MultiPolygon(vec![]);
    for segment in group {
        let buffered = buffer_path(segment, half_width)?;
        footprint = footprint.union_with(&buffered);
    }

    if footprint.0.is_empty() {
        return Err(PlannerError::GeometryDegenerate {
            operation: "buffering bridge-infill paths".to_string(),
        });
    }

    let extended = footprint.buffer(config.extend_arcs_into_perimeter);

    let area: f64 = extended.0.iter().map(polygon_area).sum();
    if area < config.min_bridge_area {
        return Err(PlannerError::RegionRejected {
            layer: layer_index,
            reason: format!("area {area:.2}mm^2 below min_bridge_area {}", config.min_bridge_area),
        });
    }

    let max_extent = extended
        .0
        .iter()
        .filter_map(|p| p.bounding_rect())
        .map(|r| r.width().max(r.height()))
        .fold(0.0_f64, f64::max);

    if max_extent < config.min_bridge_length {
        return Err(PlannerError::RegionRejected {
            layer: layer_index,
            reason: format!(
                "extent {max_extent:.2}mm below min_bridge_length {}",
                config.min_bridge_length
            ),
        });
    }

    let shares_boundary = geometry::boundary(&extended)
        .0
        .iter()
        .flat_map(|ring| ring.0.iter().copied())
        .any(|p| !geometry::contains(previous_perimeter, p));

    if !shares_boundary {
        return Err(PlannerError::RegionRejected {
            layer: layer_index,
            reason: "region boundary lies entirely within the previous perimeter".to_string(),
        });
    }

    let anchor = derive_anchor(&extended, previous_perimeter)?;

    let start = group.iter().map(|s| s.line_range.start).min().unwrap();
    let end = group.iter().map(|s| s.line_range.end).max().unwrap();

    let ambient_before = group
        .iter()
        .min_by_key(|s| s.line_range.start)
        .map(|s| s.ambient_before)
        .unwrap();

    Ok(BridgeRegion {
        polygon: extended,
        anchor,
        source_segments_range: start..end,
        layer_index,
        ambient_before,
    })
}

fn buffer_path(segment: &Segment, half_width: f64) -> Result<MultiPolygon<f64>, PlannerError> {
    let poly = geometry::polygon_from_closed_paths(std::iter::once(&segment.path));
    if !poly.0.is_empty() {
        return Ok(poly);
    }

    // an open polyline: approximate its footprint with an offset of each edge's own
    // perpendicular, by buffering a degenerate 2-point loop per edge.
    let mut result = MultiPolygon(vec![]);
    for window in segment.path.0.windows(2) {
        let loop_line = geo::LineString::from(vec![window[0], window[1], window[0]]);
        let thin = geometry::polygon_from_closed_paths(std::iter::once(&loop_line));
        let widened = thin.buffer(half_width);
        result = result.union_with(&widened);
    }

    if result.0.is_empty() {
        return Err(PlannerError::GeometryDegenerate {
            operation: "buffering an open bridge-infill path".to_string(),
        });
    }

    Ok(result)
}

fn polygon_area(poly: &geo::Polygon<f64>) -> f64 {
    use geo::Area;
    poly.unsigned_area()
}

/// The anchor boundary (§4.2): the portion of the region's own boundary that overlaps the
/// perimeter below it, i.e. the support the first arc can be centered against. When the region
/// touches more than one disjoint stretch of boundary, the longest stretch wins (§9).
fn derive_anchor(
    region: &MultiPolygon<f64>,
    previous_perimeter: &MultiPolygon<f64>,
) -> Result<geo::LineString<f64>, PlannerError> {
    let region_boundary = geometry::boundary(region);
    let perimeter_boundary = geometry::boundary(previous_perimeter);

    let mut candidates: Vec<geo::LineString<f64>> = Vec::new();
    for ring in &region_boundary.0 {
        let near: Vec<bool> = ring
            .0
            .iter()
            .map(|p| {
                perimeter_boundary
                    .0
                    .iter()
                    .any(|other| other.euclidean_distance(&geo::Point::from(*p)) < geometry::EPSILON * 10.0)
            })
            .collect();

        candidates.extend(contiguous_runs(&ring.0, &near));
    }

    candidates
        .into_iter()
        .max_by(|a, b| {
            geometry::length(a)
                .partial_cmp(&geometry::length(b))
                .unwrap()
        })
        .ok_or_else(|| PlannerError::GeometryDegenerate {
            operation: "deriving an anchor boundary for a bridge region".to_string(),
        })
}

/// Splits a closed ring's near-perimeter flags into contiguous runs of points, wrapping across
/// the ring's start/end, so a region touching the perimeter on two disjoint stretches of the
/// same ring yields one candidate per stretch instead of a single line cutting across both.
fn contiguous_runs(points: &[Pt], near: &[bool]) -> Vec<geo::LineString<f64>> {
    let n = points.len();
    if n < 2 || !near.iter().any(|&b| b) {
        return Vec::new();
    }

    if near.iter().all(|&b| b) {
        return vec![geo::LineString::new(points.to_vec())];
    }

    // start the walk at a point known not to be near, so a run straddling the ring's
    // arbitrary start index isn't split in two.
    let start = near.iter().position(|&b| !b).unwrap();

    let mut runs = Vec::new();
    let mut current: Vec<Pt> = Vec::new();
    for offset in 0..n {
        let i = (start + offset) % n;
        if near[i] {
            current.push(points[i]);
        } else if current.len() >= 2 {
            runs.push(geo::LineString::new(std::mem::take(&mut current)));
        } else {
            current.clear();
        }
    }
    if current.len() >= 2 {
        runs.push(geo::LineString::new(current));
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Layer;
    use geo::{coord, LineString};

    fn square_polygon(min: f64, max: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![geo::Polygon::new(
            LineString::from(vec![
                coord! {x: min, y: min},
                coord! {x: max, y: min},
                coord! {x: max, y: max},
                coord! {x: min, y: max},
                coord! {x: min, y: min},
            ]),
            vec![],
        )])
    }

    fn bridge_layer() -> Layer {
        Layer {
            index: 1,
            z_height: 0.4,
            segments: vec![Segment {
                kind: SegmentKind::BridgeInfill,
                path: LineString::from(vec![coord! {x: 2.0, y: 2.0}, coord! {x: 8.0, y: 2.0}]),
                extrusion_per_mm: 0.03,
                feedrate: 20.0,
                ambient_before: AmbientState {
                    fan: 0.0,
                    temperature: None,
                    feedrate: 20.0,
                },
                line_range: 10..12,
            }],
            line_range: 0..20,
        }
    }

    #[test]
    fn no_anchor_below_first_layer_yields_no_regions() {
        let layer = bridge_layer();
        let empty = MultiPolygon(vec![]);
        let results = extract_bridge_regions(&layer, &empty, &Configuration::default());
        assert!(results.is_empty());
    }

    #[test]
    fn undersized_region_is_rejected() {
        let layer = bridge_layer();
        let previous = square_polygon(0.0, 10.0);
        let config = Configuration {
            min_bridge_area: 1_000_000.0,
            ..Configuration::default()
        };

        let results = extract_bridge_regions(&layer, &previous, &config);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(PlannerError::RegionRejected { .. })));
    }

    #[test]
    fn region_not_touching_the_previous_perimeter_is_rejected() {
        // a closed 10x10 bridge-infill loop sitting well inside a 20x20 perimeter: big enough
        // to clear the area/extent thresholds, but never reaching the perimeter's own boundary
        // even after the inward extension.
        let layer = Layer {
            index: 1,
            z_height: 0.4,
            segments: vec![Segment {
                kind: SegmentKind::BridgeInfill,
                path: LineString::from(vec![
                    coord! {x: 5.0, y: 5.0},
                    coord! {x: 15.0, y: 5.0},
                    coord! {x: 15.0, y: 15.0},
                    coord! {x: 5.0, y: 15.0},
                    coord! {x: 5.0, y: 5.0},
                ]),
                extrusion_per_mm: 0.03,
                feedrate: 20.0,
                ambient_before: AmbientState {
                    fan: 0.0,
                    temperature: None,
                    feedrate: 20.0,
                },
                line_range: 10..12,
            }],
            line_range: 0..20,
        };
        let previous = square_polygon(0.0, 20.0);

        let results = extract_bridge_regions(&layer, &previous, &Configuration::default());
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(PlannerError::RegionRejected { reason, .. }) => {
                assert!(reason.contains("previous perimeter"));
            }
            other => panic!("expected RegionRejected, got {other:?}"),
        }
    }

    #[test]
    fn contiguous_runs_splits_two_disjoint_stretches() {
        // a ring where points 0-1 and 4-5 are "near" the perimeter, separated by two gaps
        // (2-3 and 6-7) on either side: two disjoint stretches, not one run spanning the ring.
        let points = vec![
            coord! {x: 0.0, y: 0.0},
            coord! {x: 1.0, y: 0.0},
            coord! {x: 2.0, y: 0.0},
            coord! {x: 3.0, y: 0.0},
            coord! {x: 4.0, y: 0.0},
            coord! {x: 5.0, y: 0.0},
            coord! {x: 6.0, y: 0.0},
            coord! {x: 7.0, y: 0.0},
        ];
        let near = vec![true, true, false, false, true, true, false, false];

        let runs = contiguous_runs(&points, &near);
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.0.len() == 2));
    }

    #[test]
    fn contiguous_runs_handles_wraparound() {
        // the "near" stretch straddles the ring's start/end index; it must still come back
        // as a single run, not two halves.
        let points = vec![
            coord! {x: 0.0, y: 0.0},
            coord! {x: 1.0, y: 0.0},
            coord! {x: 2.0, y: 0.0},
            coord! {x: 3.0, y: 0.0},
        ];
        let near = vec![true, false, false, true];

        let runs = contiguous_runs(&points, &near);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0.len(), 2);
    }
}
