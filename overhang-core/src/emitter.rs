//! Motion emitter (X, §4.4). Splices a planned [`ArcPlan`] into the [`MotionProgram`] in place
//! of the bridge-infill segments it replaces, preserving everything outside that range
//! byte-for-byte (invariant 5, §8).

use crate::config::Configuration;
use crate::error::PlannerError;
use crate::gcode::writer::render_arc_plan;
use crate::model::{ArcPatchFootprint, ArcPlan, BridgeRegion, MotionProgram};

/// Splices `plan` into `program` at `region.source_segments_range`, returning the footprint
/// handed to the follow-up rewriter (R) and the line-index delta later splices must account
/// for.
pub fn splice_arc_plan(
    program: &mut MotionProgram,
    region: &BridgeRegion,
    plan: &ArcPlan,
    layer_thickness: f64,
    config: &Configuration,
) -> Result<(ArcPatchFootprint, isize), PlannerError> {
    if region.source_segments_range.start > region.source_segments_range.end
        || region.source_segments_range.end > program.lines.len()
    {
        return Err(PlannerError::Emit {
            reason: format!(
                "bridge segment range {:?} is out of bounds for a {}-line program",
                region.source_segments_range,
                program.lines.len()
            ),
        });
    }

    let mut replacement = vec![";TYPE:Arc overhang".to_string()];
    replacement.extend(render_arc_plan(plan, layer_thickness, &region.ambient_before, config));
    replacement.push(";TYPE:End arc overhang".to_string());

    let delta = program.splice_lines(region.source_segments_range.clone(), replacement);

    let footprint = ArcPatchFootprint {
        polygon: region.polygon.clone(),
        layer_index: region.layer_index,
        z_height: layer_thickness * (region.layer_index as f64 + 1.0),
    };

    Ok((footprint, delta))
}

/// Shifts every remaining bridge region's source range by `delta` lines once an earlier splice
/// in the same layer has changed the line count, so later splices in the same pass still target
/// the right lines (§5: "splicing into M is serialized").
pub fn shift_ranges_after(regions: &mut [BridgeRegion], after_line: usize, delta: isize) {
    for region in regions.iter_mut() {
        if region.source_segments_range.start >= after_line {
            region.source_segments_range.start =
                (region.source_segments_range.start as isize + delta).max(0) as usize;
            region.source_segments_range.end =
                (region.source_segments_range.end as isize + delta).max(0) as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Arc, ArcDirection, KinematicProfile};
    use geo::{coord, LineString, MultiPolygon, Polygon};

    fn sample_program() -> MotionProgram {
        MotionProgram {
            lines: vec![
                ";LAYER_CHANGE".to_string(),
                ";Z:0.2".to_string(),
                ";TYPE:Bridge infill".to_string(),
                "G1 X1 Y1 E0.4".to_string(),
                ";TYPE:Solid infill".to_string(),
                "G1 X2 Y2 E0.4".to_string(),
            ],
            layers: vec![],
        }
    }

    fn sample_region() -> BridgeRegion {
        BridgeRegion {
            polygon: MultiPolygon(vec![Polygon::new(
                LineString::from(vec![
                    coord! {x: 0.0, y: 0.0},
                    coord! {x: 1.0, y: 0.0},
                    coord! {x: 1.0, y: 1.0},
                    coord! {x: 0.0, y: 1.0},
                    coord! {x: 0.0, y: 0.0},
                ]),
                vec![],
            )]),
            anchor: LineString::from(vec![coord! {x: 0.0, y: 0.0}, coord! {x: 1.0, y: 0.0}]),
            source_segments_range: 2..4,
            layer_index: 0,
            ambient_before: crate::model::AmbientState {
                fan: 40.0,
                temperature: None,
                feedrate: 20.0,
            },
        }
    }

    fn sample_plan() -> ArcPlan {
        ArcPlan {
            arcs: vec![Arc {
                center: coord! {x: 0.5, y: 0.5},
                radius: 0.4,
                start_angle: 0.0,
                end_angle: std::f64::consts::PI,
                direction: ArcDirection::CounterClockwise,
            }],
            start_point: coord! {x: 0.9, y: 0.5},
            kinematic_profile: KinematicProfile {
                feedrate: 15.0,
                temperature: None,
                fan: 100.0,
            },
        }
    }

    #[test]
    fn splice_preserves_lines_outside_the_range() {
        let mut program = sample_program();
        let region = sample_region();
        let plan = sample_plan();

        let (_footprint, _delta) =
            splice_arc_plan(&mut program, &region, &plan, 0.2, &Configuration::default()).unwrap();

        assert_eq!(program.lines[0], ";LAYER_CHANGE");
        assert_eq!(program.lines[1], ";Z:0.2");
        assert_eq!(program.lines.last().unwrap(), "G1 X2 Y2 E0.4");
        assert!(program.lines.contains(&";TYPE:Arc overhang".to_string()));
        assert!(program.lines.contains(&";TYPE:End arc overhang".to_string()));
    }

    #[test]
    fn out_of_bounds_range_is_an_emit_error() {
        let mut program = sample_program();
        let mut region = sample_region();
        region.source_segments_range = 10..20;
        let plan = sample_plan();

        let err = splice_arc_plan(&mut program, &region, &plan, 0.2, &Configuration::default())
            .unwrap_err();
        assert!(matches!(err, PlannerError::Emit { .. }));
    }
}
