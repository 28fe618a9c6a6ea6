//! The geometry kernel (G, §4.1): thin wrappers over `geo` and `geo_clipper` giving the rest
//! of the planner a small, robust vocabulary (buffer, boolean ops, distance, farthest point)
//! instead of spreading `geo_clipper::Clipper` calls with their scale factor everywhere.

use geo::{
    Coord, EuclideanDistance, EuclideanLength, LineString, MultiLineString, MultiPolygon, Polygon,
};
use geo_clipper::{Clipper, EndType, JoinType};

use crate::model::{Arc, Pt};

/// Numerical tolerance for "touching" (§4.1).
pub const EPSILON: f64 = 1e-6;

/// Clipper operates on scaled integers internally; this is the scale used to go from our
/// millimeter doubles to its fixed-point space. 1e5 preserves five decimal digits, comfortably
/// below [`EPSILON`].
const CLIPPER_SCALE: f64 = 1e5;

/// Buffer/union/difference/intersection over polygons, named to match the vocabulary in §4.1.
pub trait PolygonOperations {
    fn buffer(&self, distance: f64) -> MultiPolygon<f64>;
    fn union_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn intersection_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn difference_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64>;
}

impl PolygonOperations for MultiPolygon<f64> {
    fn buffer(&self, distance: f64) -> MultiPolygon<f64> {
        self.offset(
            distance,
            JoinType::Round,
            EndType::ClosedPolygon,
            CLIPPER_SCALE,
        )
    }

    fn union_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.union(other, CLIPPER_SCALE)
    }

    fn intersection_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.intersection(other, CLIPPER_SCALE)
    }

    fn difference_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.difference(other, CLIPPER_SCALE)
    }
}

impl PolygonOperations for Polygon<f64> {
    fn buffer(&self, distance: f64) -> MultiPolygon<f64> {
        self.offset(
            distance,
            JoinType::Round,
            EndType::ClosedPolygon,
            CLIPPER_SCALE,
        )
    }

    fn union_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.union(other, CLIPPER_SCALE)
    }

    fn intersection_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.intersection(other, CLIPPER_SCALE)
    }

    fn difference_with(&self, other: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.difference(other, CLIPPER_SCALE)
    }
}

/// Builds a (possibly multi-part) polygon from a set of closed paths, treating clockwise
/// rings as holes of the nearest enclosing counter-clockwise ring. Mirrors the slicer's own
/// `Slice::from_multiple_point_loop` construction.
pub fn polygon_from_closed_paths<'a, I>(paths: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = &'a LineString<f64>>,
{
    use geo::CoordsIter;

    let mut rings_and_area: Vec<(LineString<f64>, f64)> = paths
        .into_iter()
        .filter(|p| p.coords_count() >= 3)
        .map(|line| {
            let mut closed = line.clone();
            closed.close();

            let area: f64 = closed
                .0
                .windows(2)
                .map(|w| (w[0].x + w[1].x) * (w[1].y - w[0].y))
                .sum();

            (closed, area)
        })
        .filter(|(_, area)| area.abs() > EPSILON)
        .collect();

    rings_and_area.sort_by(|(_, a1), (_, a2)| a2.abs().partial_cmp(&a1.abs()).unwrap());

    let mut polygons: Vec<Polygon<f64>> = Vec::new();

    for (ring, area) in rings_and_area {
        if area > 0.0 {
            polygons.push(Polygon::new(ring, vec![]));
        } else if let Some(outer) = polygons
            .iter_mut()
            .rev()
            .find(|poly| poly.exterior().0.first().is_some() && contains_point(poly, ring.0[0]))
        {
            outer.interiors_push(ring);
        }
    }

    MultiPolygon(polygons)
}

fn contains_point(poly: &Polygon<f64>, pt: Pt) -> bool {
    use geo::Contains;
    poly.contains(&pt)
}

/// Whether `poly` contains `pt` (strictly inside or on the boundary within [`EPSILON`]).
pub fn contains(poly: &MultiPolygon<f64>, pt: Pt) -> bool {
    use geo::Contains;
    poly.contains(&pt)
}

/// All boundary rings of a polygon (exterior plus interiors, one per polygon part).
pub fn boundary(poly: &MultiPolygon<f64>) -> MultiLineString<f64> {
    let mut lines = Vec::new();
    for part in &poly.0 {
        lines.push(part.exterior().clone());
        for interior in part.interiors() {
            lines.push(interior.clone());
        }
    }
    MultiLineString(lines)
}

/// Euclidean distance between two points.
pub fn distance(a: Pt, b: Pt) -> f64 {
    a.euclidean_distance(&b)
}

/// The point on `curve` nearest to `pt`.
pub fn nearest_point(curve: &LineString<f64>, pt: Pt) -> Pt {
    curve
        .0
        .iter()
        .copied()
        .min_by(|a, b| {
            a.euclidean_distance(&pt)
                .partial_cmp(&b.euclidean_distance(&pt))
                .unwrap()
        })
        .unwrap_or(pt)
}

/// The point on `curve` farthest from `reference`, with the deterministic tie-break of
/// §4.3.5: smaller `x`, then smaller `y`.
pub fn farthest_point(curve: &LineString<f64>, reference: &MultiLineString<f64>) -> Option<Pt> {
    curve
        .0
        .iter()
        .copied()
        .map(|p| {
            let dist = reference
                .0
                .iter()
                .map(|line| distance_to_linestring(line, p))
                .fold(f64::INFINITY, f64::min);
            (p, dist)
        })
        .fold(None, |best: Option<(Pt, f64)>, (p, dist)| match best {
            None => Some((p, dist)),
            Some((bp, bd)) => {
                if dist > bd + EPSILON {
                    Some((p, dist))
                } else if (dist - bd).abs() <= EPSILON
                    && (p.x < bp.x || (p.x == bp.x && p.y < bp.y))
                {
                    Some((p, dist))
                } else {
                    Some((bp, bd))
                }
            }
        })
        .map(|(p, _)| p)
}

fn distance_to_linestring(line: &LineString<f64>, pt: Pt) -> f64 {
    line.euclidean_distance(&geo::Point::from(pt))
}

/// Discretizes `arc` into a polyline at angular resolution `step` (radians), inclusive of both
/// endpoints (§4.4).
pub fn points_on_arc(arc: &Arc, step: f64) -> Vec<Pt> {
    let swept = arc.swept_angle();
    let segment_count = (swept / step).ceil().max(1.0) as usize;
    let signed_step = match arc.direction {
        crate::model::ArcDirection::CounterClockwise => swept / segment_count as f64,
        crate::model::ArcDirection::Clockwise => -(swept / segment_count as f64),
    };

    let mut points = Vec::with_capacity(segment_count + 1);
    for i in 0..=segment_count {
        points.push(arc.point_at(arc.start_angle + signed_step * i as f64));
    }
    points
}

/// Total length of a linestring.
pub fn length(line: &LineString<f64>) -> f64 {
    line.euclidean_length()
}

/// Convenience constructor for a circular linestring, used by tests and by the planner when it
/// needs a full-circle boundary to clip against.
pub fn circle_linestring(center: Pt, radius: f64, step: f64) -> LineString<f64> {
    let segment_count = ((2.0 * std::f64::consts::PI) / step).ceil().max(3.0) as usize;
    let mut coords = Vec::with_capacity(segment_count + 1);
    for i in 0..=segment_count {
        let angle = (i as f64) * (2.0 * std::f64::consts::PI) / (segment_count as f64);
        coords.push(Coord {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        });
    }
    LineString::new(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn square(min: f64, max: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                coord! {x: min, y: min},
                coord! {x: max, y: min},
                coord! {x: max, y: max},
                coord! {x: min, y: max},
                coord! {x: min, y: min},
            ]),
            vec![],
        )
    }

    #[test]
    fn buffer_grows_a_square() {
        let poly = MultiPolygon(vec![square(0.0, 10.0)]);
        let grown = poly.buffer(1.0);

        assert!(grown.0[0].exterior().euclidean_length() > poly.0[0].exterior().euclidean_length());
    }

    #[test]
    fn union_of_disjoint_squares_has_two_parts() {
        let a = MultiPolygon(vec![square(0.0, 1.0)]);
        let b = MultiPolygon(vec![square(5.0, 6.0)]);

        assert_eq!(a.union_with(&b).0.len(), 2);
    }

    #[test]
    fn farthest_point_breaks_ties_toward_smaller_coords() {
        let curve = LineString::from(vec![
            coord! {x: -5.0, y: 0.0},
            coord! {x: 5.0, y: 0.0},
        ]);
        let reference = MultiLineString(vec![LineString::from(vec![coord! {x: 0.0, y: 0.0}])]);

        let farthest = farthest_point(&curve, &reference).unwrap();
        // both endpoints are equidistant from the origin; smaller x wins.
        assert_eq!(farthest.x, -5.0);
    }

    #[test]
    fn points_on_arc_respects_step_and_endpoints() {
        let arc = Arc {
            center: coord! {x: 0.0, y: 0.0},
            radius: 1.0,
            start_angle: 0.0,
            end_angle: std::f64::consts::FRAC_PI_2,
            direction: crate::model::ArcDirection::CounterClockwise,
        };

        let pts = points_on_arc(&arc, std::f64::consts::FRAC_PI_2 / 4.0);
        assert_eq!(pts.len(), 5);
        assert!((pts[0].x - 1.0).abs() < 1e-9);
        assert!(pts.last().unwrap().y - 1.0 < 1e-9);
    }
}
