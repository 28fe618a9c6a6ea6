//! Error taxonomy (§7). Local errors (`RegionRejected`, `PlanFailure`, `GeometryDegenerate`,
//! `Timeout`) are produced by region-scoped functions and are meant to be logged and
//! discarded by the caller; `Parse` and `Emit` are the only variants expected to abort the
//! whole run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("malformed motion program at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("bridge region at layer {layer} rejected: {reason}")]
    RegionRejected { layer: usize, reason: String },

    #[error("planner produced no usable arcs for the region at layer {layer}")]
    PlanFailure { layer: usize },

    #[error("geometry kernel returned an empty result from a non-empty input during {operation}")]
    GeometryDegenerate { operation: String },

    #[error("region at layer {layer} exceeded its {budget_ms}ms planning budget")]
    Timeout { layer: usize, budget_ms: u64 },

    #[error("splice would emit invalid motion: {reason}")]
    Emit { reason: String },

    #[error("configuration value `{setting}` must be greater than zero, got {value}")]
    ConfigLessThanOrEqualToZero { setting: String, value: f64 },

    #[error("configuration radius bounds are inverted: r_min ({r_min}) > r_max ({r_max})")]
    ConfigRadiusBoundsInverted { r_min: f64, r_max: f64 },

    #[error("could not read sidecar configuration file {path}")]
    SidecarFileUnreadable { path: String },

    #[error("sidecar configuration file {path} is malformed at line {line}")]
    SidecarFileMalformed { path: String, line: usize },
}

impl PlannerError {
    /// Local errors leave the offending bridge region untouched and are only ever logged;
    /// everything else aborts the run (§7).
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            PlannerError::RegionRejected { .. }
                | PlannerError::PlanFailure { .. }
                | PlannerError::GeometryDegenerate { .. }
                | PlannerError::Timeout { .. }
        )
    }
}
