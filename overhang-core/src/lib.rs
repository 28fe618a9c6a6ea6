//! Arc-overhang toolpath generation core.
//!
//! Reads a sliced motion program, finds its bridge-infill regions, replaces each with a set of
//! concentric circular arcs a FDM printer can deposit without support, and splices the result
//! back into the program in place.
//!
//! The pipeline is four stages, named the way the design doc names them:
//! bridge region extraction (E, [`extractor`]), arc planning (P, [`planner`]), motion emission
//! (X, [`emitter`]), and an interface-only post-layer rewriter (R, [`rewriter`]).

pub mod config;
pub mod emitter;
pub mod error;
pub mod extractor;
pub mod gcode;
pub mod geometry;
pub mod model;
pub mod planner;
pub mod rewriter;

use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

use config::Configuration;
use error::PlannerError;
use model::{ArcPatchFootprint, BridgeRegion, MotionProgram};
use rewriter::{FollowupDirective, FollowupRewriter, PassthroughRewriter};

/// The fan/speed directive R computed for one layer above an arc patch (§4.5/§10.6). Applying
/// it to the program's infill moves is left to the caller, since the space-filling rewrite
/// `PassthroughRewriter` leaves out of scope is a prerequisite for doing so safely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerFollowup {
    pub layer_index: usize,
    pub directive: FollowupDirective,
}

/// What a full run produced: the (possibly rewritten) program, the footprints of every arc
/// patch emitted (for callers that want to drive their own rewriter), the diagnostics for
/// regions that were found but not planned, and the follow-up fan/speed directives R computed
/// for the layers printed just above those patches.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub program: MotionProgram,
    pub patches: Vec<ArcPatchFootprint>,
    pub diagnostics: Vec<PlannerError>,
    pub followups: Vec<LayerFollowup>,
}

/// Runs the whole pipeline over an already-parsed motion program.
///
/// Bridge regions are extracted layer by layer (using the previous layer's outer-perimeter
/// polygon as the anchor boundary), planned, and spliced in, in layer order. Region-local
/// failures (`RegionRejected`, `PlanFailure`, `GeometryDegenerate`, `Timeout`) are collected as
/// diagnostics rather than aborting the run; anything else propagates.
pub fn process(mut program: MotionProgram, config: &Configuration) -> Result<ProcessOutcome, PlannerError> {
    config.validate()?;

    let layer_thickness = estimate_layer_thickness(&program);

    let mut accepted: Vec<BridgeRegion> = Vec::new();
    let mut diagnostics: Vec<PlannerError> = Vec::new();

    let mut previous_perimeter = geo::MultiPolygon(vec![]);
    for layer in &program.layers {
        for result in extractor::extract_bridge_regions(layer, &previous_perimeter, config) {
            match result {
                Ok(region) => accepted.push(region),
                Err(err) => diagnostics.push(err),
            }
        }
        previous_perimeter = layer.outer_perimeter_polygon();
    }

    // deterministic order within and across layers (§5): layer index, then region centroid.
    accepted.sort_by(|a, b| {
        a.layer_index.cmp(&b.layer_index).then_with(|| {
            centroid_x(a).partial_cmp(&centroid_x(b)).unwrap().then_with(|| {
                centroid_y(a).partial_cmp(&centroid_y(b)).unwrap()
            })
        })
    });

    // §5: independent regions may be planned concurrently behind the `parallel` setting, using
    // the same work-stealing iterator the reference workspace uses for its per-layer passes.
    let mut planned: Vec<(BridgeRegion, Option<Result<model::ArcPlan, PlannerError>>)> = accepted
        .into_iter()
        .map(|region| (region, None))
        .collect();

    if config.parallel {
        planned.par_iter_mut().for_each(|(region, outcome)| {
            *outcome = Some(planner::plan(region, config));
        });
    } else {
        for (region, outcome) in planned.iter_mut() {
            *outcome = Some(planner::plan(region, config));
        }
    }

    let mut patches = Vec::new();
    let mut cumulative_delta: isize = 0;

    for (mut region, outcome) in planned {
        region.source_segments_range.start =
            (region.source_segments_range.start as isize + cumulative_delta).max(0) as usize;
        region.source_segments_range.end =
            (region.source_segments_range.end as isize + cumulative_delta).max(0) as usize;

        match outcome.expect("every region was planned above") {
            Ok(plan) => {
                match emitter::splice_arc_plan(&mut program, &region, &plan, layer_thickness, config) {
                    Ok((footprint, delta)) => {
                        cumulative_delta += delta;
                        patches.push(footprint);
                    }
                    Err(err) => diagnostics.push(err),
                }
            }
            Err(err) => diagnostics.push(err),
        }
    }

    let followups = apply_followup(&program, &patches, config);

    Ok(ProcessOutcome {
        program,
        patches,
        diagnostics,
        followups,
    })
}

fn centroid_x(region: &BridgeRegion) -> f64 {
    use geo::Centroid;
    region.polygon.centroid().map(|c| c.x()).unwrap_or(0.0)
}

fn centroid_y(region: &BridgeRegion) -> f64 {
    use geo::Centroid;
    region.polygon.centroid().map(|c| c.y()).unwrap_or(0.0)
}

/// Takes the smallest positive consecutive `;Z:` delta in the program as the layer thickness,
/// falling back to a common default when the program has fewer than two layers.
fn estimate_layer_thickness(program: &MotionProgram) -> f64 {
    const DEFAULT_LAYER_THICKNESS: f64 = 0.2;

    let smallest_positive_delta = program
        .layers
        .windows(2)
        .map(|w| (w[1].z_height - w[0].z_height).abs())
        .filter(|d| *d > f64::EPSILON)
        .fold(f64::INFINITY, f64::min);

    if smallest_positive_delta.is_finite() {
        smallest_positive_delta
    } else {
        DEFAULT_LAYER_THICKNESS
    }
}

/// Runs R over every layer/patch pair, merging directives that land on the same layer (several
/// patches below it) by taking the strongest cooling/slowdown of the two: the higher fan speed
/// and the lower speed factor.
fn apply_followup(
    program: &MotionProgram,
    patches: &[ArcPatchFootprint],
    config: &Configuration,
) -> Vec<LayerFollowup> {
    let rewriter = PassthroughRewriter;
    let mut by_layer: std::collections::BTreeMap<usize, FollowupDirective> =
        std::collections::BTreeMap::new();

    for layer in &program.layers {
        for patch in patches {
            if let Some(directive) = rewriter.rewrite(layer, patch, config) {
                by_layer
                    .entry(layer.index)
                    .and_modify(|existing| {
                        existing.fan = existing.fan.max(directive.fan);
                        existing.speed_factor = existing.speed_factor.min(directive.speed_factor);
                    })
                    .or_insert(directive);
            }
        }
    }

    by_layer
        .into_iter()
        .map(|(layer_index, directive)| LayerFollowup {
            layer_index,
            directive,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_BRIDGES: &str = "\
;LAYER_CHANGE
;Z:0.2
;TYPE:External perimeter
G1 X0 Y0 F1200
G1 X10 Y0 E0.5
G1 X10 Y10 E0.5
";

    #[test]
    fn a_program_with_no_bridges_is_left_untouched() {
        let program = gcode::parser::parse(NO_BRIDGES).unwrap();
        let original = program.render();

        let outcome = process(program, &Configuration::default()).unwrap();
        assert_eq!(outcome.program.render(), original);
        assert!(outcome.patches.is_empty());
    }
}
