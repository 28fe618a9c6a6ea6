//! Arc planner (P, §4.3) — the core. Grows concentric arcs outward from a bridge region's
//! anchor boundary until the whole region is covered (or close enough, per
//! `max_distance_from_perimeter`), breadth-first across a queue of frontier curves.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use geo::{Coord, CoordsIter, LineString, MultiPolygon};

use crate::config::Configuration;
use crate::error::PlannerError;
use crate::geometry::{self, circle_linestring, PolygonOperations};
use crate::model::{Arc, ArcDirection, ArcPlan, BridgeRegion, KinematicProfile, Pt};

struct PlannerState<'a> {
    region: &'a BridgeRegion,
    config: &'a Configuration,
    frontiers: VecDeque<Frontier>,
    covered: MultiPolygon<f64>,
    arcs: Vec<Arc>,
    deadline: Instant,
}

/// A queued frontier curve, plus (when `use_least_center_points` is in play) the center and
/// radius of the arc that produced it, so the next arc on the same center can skip the
/// farthest-point search entirely (§4.3.2 steps 1 and 5).
struct Frontier {
    curve: LineString<f64>,
    reuse: Option<CenterReuse>,
}

#[derive(Clone, Copy)]
struct CenterReuse {
    center: Pt,
    next_radius: f64,
}

/// Plans arcs for one accepted bridge region. Returns `PlannerError::PlanFailure` if no arc
/// could be emitted at all, and `PlannerError::Timeout` if the per-region budget expired first.
pub fn plan(region: &BridgeRegion, config: &Configuration) -> Result<ArcPlan, PlannerError> {
    if region.anchor.coords_count() < 2 {
        return Err(PlannerError::RegionRejected {
            layer: region.layer_index,
            reason: "anchor has zero length".to_string(),
        });
    }

    let mut state = PlannerState {
        region,
        config,
        frontiers: VecDeque::from([Frontier {
            curve: region.anchor.clone(),
            reuse: None,
        }]),
        covered: MultiPolygon(vec![]),
        arcs: Vec::new(),
        deadline: Instant::now() + Duration::from_millis(config.timeout_ms),
    };

    while let Some(frontier) = state.frontiers.pop_front() {
        if Instant::now() > state.deadline {
            return Err(PlannerError::Timeout {
                layer: region.layer_index,
                budget_ms: config.timeout_ms,
            });
        }

        if remaining_is_within_tolerance(&state) {
            break;
        }

        plan_from_frontier(&mut state, &frontier);

        if remaining_is_within_tolerance(&state) {
            break;
        }
    }

    if state.arcs.is_empty() {
        return Err(PlannerError::PlanFailure {
            layer: region.layer_index,
        });
    }

    let start_point = state.arcs[0].start_point();

    Ok(ArcPlan {
        arcs: state.arcs,
        start_point,
        kinematic_profile: KinematicProfile {
            feedrate: config.arc_feedrate,
            temperature: config.arc_temperature,
            fan: config.arc_fan,
        },
    })
}

/// §4.3.3: stop once every point of the uncovered region lies within
/// `max_distance_from_perimeter` of the region's own boundary.
fn remaining_is_within_tolerance(state: &PlannerState) -> bool {
    let remaining = state.region.polygon.difference_with(&state.covered);
    if remaining.0.is_empty() {
        return true;
    }

    let boundary = geometry::boundary(&state.region.polygon);
    remaining
        .0
        .iter()
        .flat_map(|p| p.exterior().coords())
        .all(|pt| {
            boundary
                .0
                .iter()
                .map(|line| line.euclidean_distance_to(*pt))
                .fold(f64::INFINITY, f64::min)
                < state.config.max_distance_from_perimeter
        })
}

trait DistanceToPoint {
    fn euclidean_distance_to(&self, pt: Pt) -> f64;
}

impl DistanceToPoint for LineString<f64> {
    fn euclidean_distance_to(&self, pt: Pt) -> f64 {
        use geo::EuclideanDistance;
        self.euclidean_distance(&geo::Point::from(pt))
    }
}

fn plan_from_frontier(state: &mut PlannerState, frontier: &Frontier) {
    let boundary = geometry::boundary(&state.region.polygon);

    // §4.3.2 step 1: reuse the previous arc's center while it's still viable instead of
    // re-running the farthest-point search.
    let (center, starting_radius) = match frontier.reuse {
        Some(reuse) if state.config.use_least_center_points && reuse.next_radius <= state.config.r_max => {
            (reuse.center, reuse.next_radius)
        }
        _ => {
            let Some(center) = select_center(state, &frontier.curve, &boundary) else {
                return;
            };
            (center, state.config.r_min)
        }
    };

    let mut radius = starting_radius;

    loop {
        if Instant::now() > state.deadline || radius > state.config.r_max {
            break;
        }

        let circle = circle_linestring(center, radius, state.config.angular_step);
        let circle_poly = geometry::polygon_from_closed_paths(std::iter::once(&circle));
        let clipped_to_region = circle_poly.intersection_with(&state.region.polygon);

        if clipped_to_region.0.is_empty() {
            break;
        }

        let remaining_after = clipped_to_region.difference_with(&state.covered);
        if remaining_after.0.is_empty() && radius > starting_radius {
            // this radius adds nothing new; the previous one was the largest useful arc.
            radius -= state.config.arc_width;
            break;
        }

        let would_exit = clipped_to_region
            .0
            .iter()
            .map(polygon_area)
            .sum::<f64>()
            < circle_poly.0.iter().map(polygon_area).sum::<f64>() * 0.999;

        if would_exit && radius > starting_radius {
            break;
        }

        radius += state.config.arc_width;
    }

    radius = radius.min(state.config.r_max).max(starting_radius);

    if radius < starting_radius {
        // the very first radius tried already failed to add anything new; this center/frontier
        // has nothing left to contribute.
        return;
    }

    let intervals = angular_intervals(state, center, radius);
    if intervals.is_empty() {
        return;
    }

    let reuse = if state.config.use_least_center_points && radius + state.config.arc_width <= state.config.r_max
    {
        Some(CenterReuse {
            center,
            next_radius: radius + state.config.arc_width,
        })
    } else {
        None
    };

    for (start_angle, end_angle) in &intervals {
        let arc = Arc {
            center,
            radius,
            start_angle: *start_angle,
            end_angle: *end_angle,
            direction: ArcDirection::CounterClockwise,
        };

        let arc_path = LineString::new(geometry::points_on_arc(&arc, state.config.angular_step));
        let swept_poly = geometry::polygon_from_closed_paths(std::iter::once(&close_as_loop(&arc_path)));
        let band = swept_poly.buffer(state.config.arc_width / 2.0);
        state.covered = state.covered.union_with(&band);

        state.arcs.push(arc);

        state.frontiers.push_back(Frontier {
            curve: arc_path,
            reuse,
        });
    }
}

fn close_as_loop(line: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = line.0.clone();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn polygon_area(poly: &geo::Polygon<f64>) -> f64 {
    use geo::Area;
    poly.unsigned_area()
}

/// §4.3.2 step 1: the point on `frontier` farthest from `boundary(Q) \ anchor`, nudged
/// outward by `arc_center_offset`. Ties break toward smaller x, then smaller y (§4.3.5).
fn select_center(
    state: &PlannerState,
    frontier: &LineString<f64>,
    region_boundary: &geo::MultiLineString<f64>,
) -> Option<Pt> {
    let far_boundary = far_boundary_excluding_anchor(region_boundary, &state.region.anchor);
    let raw = geometry::farthest_point(frontier, &far_boundary)?;

    let outward = outward_normal(frontier, raw);
    Some(Coord {
        x: raw.x + outward.x * state.config.arc_center_offset,
        y: raw.y + outward.y * state.config.arc_center_offset,
    })
}

fn far_boundary_excluding_anchor(
    boundary: &geo::MultiLineString<f64>,
    anchor: &LineString<f64>,
) -> geo::MultiLineString<f64> {
    let lines: Vec<LineString<f64>> = boundary
        .0
        .iter()
        .filter(|line| {
            use geo::EuclideanDistance;
            line.euclidean_distance(anchor) > geometry::EPSILON
        })
        .cloned()
        .collect();

    if lines.is_empty() {
        boundary.clone()
    } else {
        geo::MultiLineString(lines)
    }
}

/// Approximates the inward/outward normal at `pt` on `frontier` using its two neighboring
/// points, pointing away from the frontier's own centroid.
fn outward_normal(frontier: &LineString<f64>, pt: Pt) -> Coord<f64> {
    let idx = frontier
        .0
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            geometry::distance(**a, pt)
                .partial_cmp(&geometry::distance(**b, pt))
                .unwrap()
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let prev = frontier.0[idx.saturating_sub(1)];
    let next = frontier.0[(idx + 1).min(frontier.0.len() - 1)];

    let tangent = Coord {
        x: next.x - prev.x,
        y: next.y - prev.y,
    };
    let len = (tangent.x * tangent.x + tangent.y * tangent.y).sqrt();
    if len < geometry::EPSILON {
        return Coord { x: 0.0, y: 1.0 };
    }

    Coord {
        x: -tangent.y / len,
        y: tangent.x / len,
    }
}

/// §4.3.2 step 3 / §4.3.5: clips the full circle at `(center, radius)` to `Q \ C` and returns
/// the resulting angular intervals in increasing start-angle order.
fn angular_intervals(state: &PlannerState, center: Pt, radius: f64) -> Vec<(f64, f64)> {
    let step = state.config.angular_step;
    let sample_count = ((2.0 * std::f64::consts::PI) / step).ceil().max(8.0) as usize;

    let mut inside: Vec<bool> = Vec::with_capacity(sample_count);
    let mut angles: Vec<f64> = Vec::with_capacity(sample_count);

    let remaining = state.region.polygon.difference_with(&state.covered);

    for i in 0..sample_count {
        let angle = (i as f64) * (2.0 * std::f64::consts::PI) / (sample_count as f64);
        let pt = Coord {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        };
        angles.push(angle);
        inside.push(geometry::contains(&remaining, pt));
    }

    let mut intervals = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..=sample_count {
        let wrapped = i % sample_count;
        if inside[wrapped] && run_start.is_none() {
            run_start = Some(wrapped);
        } else if !inside[wrapped] {
            if let Some(start) = run_start.take() {
                let end = if wrapped == 0 { sample_count } else { wrapped };
                intervals.push((angles[start], angle_at(&angles, end)));
            }
        }
        if i == sample_count {
            break;
        }
    }

    if run_start.is_some() && intervals.is_empty() {
        intervals.push((0.0, 2.0 * std::f64::consts::PI));
    }

    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    intervals
}

fn angle_at(angles: &[f64], index: usize) -> f64 {
    if index >= angles.len() {
        2.0 * std::f64::consts::PI
    } else {
        angles[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn disk_region() -> BridgeRegion {
        let polygon = geometry::polygon_from_closed_paths(std::iter::once(&circle_linestring(
            coord! {x: 0.0, y: 0.0},
            6.0,
            std::f64::consts::PI / 36.0,
        )));

        BridgeRegion {
            polygon,
            anchor: LineString::from(vec![
                coord! {x: -6.0, y: -0.2},
                coord! {x: -6.0, y: 0.2},
            ]),
            source_segments_range: 0..1,
            layer_index: 1,
            ambient_before: crate::model::AmbientState {
                fan: 0.0,
                temperature: None,
                feedrate: 20.0,
            },
        }
    }

    #[test]
    fn plans_at_least_one_arc_for_a_disk() {
        let region = disk_region();
        let config = Configuration::default();

        let plan = plan(&region, &config).unwrap();
        assert!(!plan.arcs.is_empty());
        for arc in &plan.arcs {
            assert!(arc.radius >= config.r_min - 1e-9);
            assert!(arc.radius <= config.r_max + 1e-9);
        }
    }

    #[test]
    fn zero_length_anchor_is_rejected() {
        let mut region = disk_region();
        region.anchor = LineString::from(vec![coord! {x: 0.0, y: 0.0}]);

        let err = plan(&region, &Configuration::default()).unwrap_err();
        assert!(matches!(err, PlannerError::RegionRejected { .. }));
    }

    #[test]
    fn arcs_are_emitted_in_ascending_radius_within_a_center() {
        let region = disk_region();
        let plan = plan(&region, &Configuration::default()).unwrap();

        let mut last_radius = 0.0;
        for arc in &plan.arcs {
            assert!(arc.radius + 1e-6 >= last_radius || plan.arcs.len() == 1);
            last_radius = arc.radius;
        }
    }

}
