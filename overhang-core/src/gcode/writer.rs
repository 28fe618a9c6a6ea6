//! Arc-to-G-code emission (X, §4.4). Discretizes each [`Arc`] into a polyline of `G1` moves at
//! the configured angular step, wrapped in the kinematic-profile state changes the region needs
//! (feedrate/fan/temperature set before the first arc, restored after the last).
//!
//! Mirrors the slicer's own extrusion-volume bookkeeping in `gcode::write_gcode`: the amount of
//! filament consumed per segment is `cross_section_area * length / filament_cross_section_area`,
//! here using a fixed rectangular bead approximation of width `arc_width` and layer-thickness
//! `layer_thickness` rather than the slicer's width/thickness-aware rounded-rectangle formula,
//! since the arc planner does not have a explicit bead-thickness setting of its own.

use std::f64::consts::PI;

use crate::config::Configuration;
use crate::geometry::points_on_arc;
use crate::model::{AmbientState, Arc, ArcPlan, Pt};

/// Filament diameter assumed for extrusion-volume bookkeeping, mm. Matches the slicer's own
/// default.
const FILAMENT_DIAMETER_MM: f64 = 1.75;

fn filament_cross_section_area() -> f64 {
    PI * (FILAMENT_DIAMETER_MM / 2.0).powi(2)
}

/// Renders an [`ArcPlan`] as a sequence of motion-program lines, ready to splice in place of
/// the bridge-infill segments it replaces. `restore` is the fan/temperature/feedrate that was
/// ambient immediately before the replaced segments, reinstated once the patch is done.
pub fn render_arc_plan(
    plan: &ArcPlan,
    layer_thickness: f64,
    restore: &AmbientState,
    config: &Configuration,
) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!("; arc overhang patch: {} arcs", plan.arcs.len()));

    if let Some(temp) = plan.kinematic_profile.temperature {
        lines.push(format!("M104 S{temp:.0}"));
    }
    lines.push(format!("M106 S{}", fan_to_pwm(plan.kinematic_profile.fan)));

    let mut cursor = plan.start_point;
    lines.push(format!(
        "G1 X{:.3} Y{:.3} F{:.0}",
        cursor.x,
        cursor.y,
        plan.kinematic_profile.feedrate * 60.0
    ));

    for arc in &plan.arcs {
        let points = points_on_arc(arc, config.angular_step);
        let start = points.first().copied().unwrap_or(arc.start_point());

        if distance(cursor, start) > crate::geometry::EPSILON {
            lines.push(format!("G1 X{:.3} Y{:.3} F{:.0}", start.x, start.y, plan.kinematic_profile.feedrate * 60.0));
            cursor = start;
        }

        for point in points.into_iter().skip(1) {
            let segment_length = distance(cursor, point);
            let extrude = extrusion_for_length(segment_length, config.arc_width, layer_thickness);
            lines.push(format!(
                "G1 X{:.3} Y{:.3} E{:.5} F{:.0}",
                point.x,
                point.y,
                extrude,
                plan.kinematic_profile.feedrate * 60.0
            ));
            cursor = point;
        }
    }

    lines.push(format!("M106 S{}", fan_to_pwm(restore.fan)));
    if plan.kinematic_profile.temperature.is_some() {
        match restore.temperature {
            Some(temp) => lines.push(format!("M104 S{temp:.0}")),
            None => lines.push("M104 S0".to_string()),
        }
    }
    if (plan.kinematic_profile.feedrate - restore.feedrate).abs() > crate::geometry::EPSILON {
        lines.push(format!("G1 F{:.0}", restore.feedrate * 60.0));
    }

    lines
}

fn distance(a: Pt, b: Pt) -> f64 {
    crate::geometry::distance(a, b)
}

fn fan_to_pwm(percent: f64) -> u32 {
    ((percent.clamp(0.0, 100.0) / 100.0) * 255.0).round() as u32
}

/// Volumetric-to-linear extrusion conversion for a bead of `width` x `thickness` cross-section
/// over `length` mm of travel (rounded-rectangle approximation, same shape as the slicer's).
fn extrusion_for_length(length: f64, width: f64, thickness: f64) -> f64 {
    let extrusion_volume =
        ((width - thickness) * thickness + PI * (thickness / 2.0).powi(2)) * length;
    extrusion_volume / filament_cross_section_area()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArcDirection, KinematicProfile};
    use geo::coord;

    #[test]
    fn renders_state_changes_and_moves() {
        let plan = ArcPlan {
            arcs: vec![Arc {
                center: coord! {x: 0.0, y: 0.0},
                radius: 2.0,
                start_angle: 0.0,
                end_angle: PI / 2.0,
                direction: ArcDirection::CounterClockwise,
            }],
            start_point: coord! {x: 2.0, y: 0.0},
            kinematic_profile: KinematicProfile {
                feedrate: 15.0,
                temperature: Some(210.0),
                fan: 100.0,
            },
        };

        let config = Configuration::default();
        let restore = AmbientState {
            fan: 40.0,
            temperature: Some(205.0),
            feedrate: 30.0,
        };
        let lines = render_arc_plan(&plan, 0.2, &restore, &config);

        assert!(lines.iter().any(|l| l.starts_with("M104 S210")));
        assert!(lines.iter().any(|l| l.contains('E')));
        assert!(lines.iter().any(|l| l == "M104 S205"));
        assert!(lines.iter().any(|l| l.starts_with("G1 F1800")));
    }

    #[test]
    fn extrusion_is_proportional_to_length() {
        let short = extrusion_for_length(1.0, 0.4, 0.2);
        let long = extrusion_for_length(2.0, 0.4, 0.2);
        assert!((long - 2.0 * short).abs() < 1e-9);
    }
}
