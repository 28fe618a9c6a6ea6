//! The motion-program and arc data model (§3 of the design).

use std::ops::Range;

use geo::{Coord, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

/// A point in the 2D build plane, millimeters, double precision.
pub type Pt = Coord<f64>;

/// The kind of a single motion segment, as recognized from `;TYPE:` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Travel,
    OuterPerimeter,
    InnerPerimeter,
    SolidInfill,
    BridgeInfill,
    Other,
}

impl SegmentKind {
    /// Maps a `;TYPE:` marker's payload to a segment kind. Unrecognized markers become `Other`.
    pub fn from_type_marker(marker: &str) -> Self {
        match marker.trim() {
            "External perimeter" => SegmentKind::OuterPerimeter,
            "Perimeter" => SegmentKind::InnerPerimeter,
            "Solid infill" | "Top solid infill" | "Bottom solid infill" => {
                SegmentKind::SolidInfill
            }
            "Bridge infill" => SegmentKind::BridgeInfill,
            _ => SegmentKind::Other,
        }
    }
}

/// The fan/temperature/feedrate in effect immediately before a segment's own moves begin,
/// i.e. what a later splice at that point needs to restore once it's done overriding them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientState {
    pub fan: f64,
    pub temperature: Option<f64>,
    pub feedrate: f64,
}

/// A single typed motion segment: the path it traces plus the extruder state needed to
/// reproduce it. `line_range` anchors it back into the source file's line array so splicing
/// can replace exactly this range and leave everything else byte-identical.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub path: LineString<f64>,
    pub extrusion_per_mm: f64,
    pub feedrate: f64,
    pub ambient_before: AmbientState,
    pub line_range: Range<usize>,
}

/// One layer of the motion program.
#[derive(Debug, Clone)]
pub struct Layer {
    pub index: usize,
    pub z_height: f64,
    pub segments: Vec<Segment>,
    /// The lines belonging to this layer, `;LAYER_CHANGE` through the line before the next one.
    pub line_range: Range<usize>,
}

impl Layer {
    /// The outer-perimeter footprint of this layer, used as the anchor boundary for the
    /// *next* layer's bridge regions.
    pub fn outer_perimeter_polygon(&self) -> MultiPolygon<f64> {
        crate::geometry::polygon_from_closed_paths(
            self.segments
                .iter()
                .filter(|s| s.kind == SegmentKind::OuterPerimeter)
                .map(|s| &s.path),
        )
    }
}

/// The whole parsed motion program: the raw lines (so unrecognized content is preserved
/// verbatim) plus the structured layer/segment index over them.
#[derive(Debug, Clone)]
pub struct MotionProgram {
    pub lines: Vec<String>,
    pub layers: Vec<Layer>,
}

impl MotionProgram {
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Replaces `range` (a half-open span of line indices) with `replacement`, returning the
    /// index delta so callers can adjust later ranges.
    pub fn splice_lines(&mut self, range: Range<usize>, replacement: Vec<String>) -> isize {
        let delta = replacement.len() as isize - (range.end - range.start) as isize;
        self.lines.splice(range, replacement);
        delta
    }
}

/// Rotation sense of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// A single circular arc: `radius in [r_min, r_max]`, swept from `start_angle` to `end_angle`
/// (radians, increasing in the direction of travel) around `center`.
#[derive(Debug, Clone, Copy)]
pub struct Arc {
    pub center: Pt,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub direction: ArcDirection,
}

impl Arc {
    pub fn swept_angle(&self) -> f64 {
        (self.end_angle - self.start_angle).abs()
    }

    pub fn point_at(&self, angle: f64) -> Pt {
        Coord {
            x: self.center.x + self.radius * angle.cos(),
            y: self.center.y + self.radius * angle.sin(),
        }
    }

    pub fn start_point(&self) -> Pt {
        self.point_at(self.start_angle)
    }

    pub fn end_point(&self) -> Pt {
        self.point_at(self.end_angle)
    }
}

/// Feedrate/temperature/fan overrides applied for the duration of an arc patch.
#[derive(Debug, Clone)]
pub struct KinematicProfile {
    pub feedrate: f64,
    pub temperature: Option<f64>,
    pub fan: f64,
}

/// The planner's output: an ordered list of arcs plus the state needed to print them.
#[derive(Debug, Clone)]
pub struct ArcPlan {
    pub arcs: Vec<Arc>,
    pub start_point: Pt,
    pub kinematic_profile: KinematicProfile,
}

/// A candidate bridge region: its thickened footprint, the boundary it anchors on, and the
/// source line range of the bridge-infill segments it replaces.
#[derive(Debug, Clone)]
pub struct BridgeRegion {
    pub polygon: MultiPolygon<f64>,
    pub anchor: LineString<f64>,
    pub source_segments_range: Range<usize>,
    pub layer_index: usize,
    /// The fan/temperature/feedrate active just before the bridge-infill segments this region
    /// replaces, restored once the arc patch that supersedes them has run.
    pub ambient_before: AmbientState,
}

/// The footprint and z-range of one emitted arc patch, handed to the follow-up rewriter (R).
#[derive(Debug, Clone)]
pub struct ArcPatchFootprint {
    pub polygon: MultiPolygon<f64>,
    pub layer_index: usize,
    pub z_height: f64,
}
