//! Post-layer rewriter (R, §4.5) — interface only. Layers printed just above an arc patch
//! benefit from a denser infill pattern and a gentler fan/speed profile while the patch cools;
//! the actual space-filling curve is out of scope, but the trait and the state changes it can
//! apply are real and exercised end to end (§10.6).

use crate::config::Configuration;
use crate::model::{ArcPatchFootprint, Layer};

/// A directive R applies to a layer above an arc patch, independent of whatever infill
/// rewriting a future implementation performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowupDirective {
    pub fan: f64,
    pub speed_factor: f64,
}

/// Rewrites the solid-infill segments of layers printed above a recent arc patch.
///
/// A production rewriter would replace `SolidInfill` segments whose footprint overlaps
/// `footprint.polygon` with a space-filling curve; [`PassthroughRewriter`] is the only
/// implementation shipped here, applying just the fan/speed directive.
pub trait FollowupRewriter {
    fn rewrite(&self, layer: &Layer, footprint: &ArcPatchFootprint, config: &Configuration)
        -> Option<FollowupDirective>;
}

/// Ships the fan/speed-factor directive for any layer within one layer height of an arc
/// patch; does not touch infill geometry.
pub struct PassthroughRewriter;

impl FollowupRewriter for PassthroughRewriter {
    fn rewrite(
        &self,
        layer: &Layer,
        footprint: &ArcPatchFootprint,
        config: &Configuration,
    ) -> Option<FollowupDirective> {
        let layer_thickness = if layer.z_height > footprint.z_height {
            layer.z_height - footprint.z_height
        } else {
            return None;
        };

        // only the first layer or two directly above the patch need the gentler profile.
        if layer_thickness > config.max_distance_from_perimeter {
            return None;
        }

        Some(FollowupDirective {
            fan: config.followup_fan,
            speed_factor: config.followup_speed_factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::MultiPolygon;

    fn footprint(z_height: f64) -> ArcPatchFootprint {
        ArcPatchFootprint {
            polygon: MultiPolygon(vec![]),
            layer_index: 0,
            z_height,
        }
    }

    fn layer(z_height: f64) -> Layer {
        Layer {
            index: 1,
            z_height,
            segments: vec![],
            line_range: 0..0,
        }
    }

    #[test]
    fn applies_directive_just_above_a_patch() {
        let rewriter = PassthroughRewriter;
        let config = Configuration::default();

        let directive = rewriter
            .rewrite(&layer(0.4), &footprint(0.2), &config)
            .unwrap();
        assert_eq!(directive.fan, config.followup_fan);
        assert_eq!(directive.speed_factor, config.followup_speed_factor);
    }

    #[test]
    fn skips_layers_far_above_a_patch() {
        let rewriter = PassthroughRewriter;
        let config = Configuration::default();

        assert!(rewriter.rewrite(&layer(50.0), &footprint(0.2), &config).is_none());
    }

    #[test]
    fn skips_layers_below_a_patch() {
        let rewriter = PassthroughRewriter;
        let config = Configuration::default();

        assert!(rewriter.rewrite(&layer(0.1), &footprint(0.2), &config).is_none());
    }
}
