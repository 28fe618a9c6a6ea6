//! Planner configuration (§3, §6.4, §10.3). Compile-time defaults, with an optional sidecar
//! key/value file overriding them, in the same flat `key = value` shape as the slicer's own
//! end-of-file config-block comments (§6.1).

use std::path::Path;

use crate::error::PlannerError;

macro_rules! reject_if_not_positive {
    ($config:ident, $field:ident) => {
        if $config.$field <= 0.0 {
            return Err(PlannerError::ConfigLessThanOrEqualToZero {
                setting: stringify!($field).to_string(),
                value: $config.$field as f64,
            });
        }
    };
}

/// All values the planner consults, gathered in one place so no part of the pipeline needs
/// process-wide mutable configuration (§9).
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Nominal arc extrusion width, mm.
    pub arc_width: f64,
    /// Minimum arc radius, mm. Normally one arc width.
    pub r_min: f64,
    /// Maximum arc radius, mm.
    pub r_max: f64,
    /// Distance the next arc's center is nudged away from the last contact point.
    pub arc_center_offset: f64,
    /// Inward expansion of the region before planning.
    pub extend_arcs_into_perimeter: f64,
    /// Planning stops once the farthest uncovered point is within this distance of the
    /// region boundary.
    pub max_distance_from_perimeter: f64,
    /// Regions smaller than this are rejected.
    pub min_bridge_area: f64,
    /// Regions with less linear extent than this are rejected.
    pub min_bridge_length: f64,
    /// Reuse one center until `r_max` before spawning a new one.
    pub use_least_center_points: bool,
    /// Arc discretization step, radians.
    pub angular_step: f64,
    /// Feedrate override while printing arcs, mm/s.
    pub arc_feedrate: f64,
    /// Optional extruder temperature override while printing arcs, °C.
    pub arc_temperature: Option<f64>,
    /// Fan speed override while printing arcs, percent.
    pub arc_fan: f64,
    /// Fan speed applied to layers above an arc patch (R, §4.5).
    pub followup_fan: f64,
    /// Speed multiplier applied to layers above an arc patch (R, §4.5).
    pub followup_speed_factor: f64,
    /// Per-region wall-clock planning budget, milliseconds (§5).
    pub timeout_ms: u64,
    /// Whether independent bridge regions may be planned concurrently (§5, §10.7).
    pub parallel: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            arc_width: 0.4,
            r_min: 0.4,
            r_max: 8.0,
            arc_center_offset: 1.0,
            extend_arcs_into_perimeter: 0.2,
            max_distance_from_perimeter: 2.0,
            min_bridge_area: 20.0,
            min_bridge_length: 5.0,
            use_least_center_points: false,
            angular_step: std::f64::consts::PI / 180.0,
            arc_feedrate: 15.0,
            arc_temperature: None,
            arc_fan: 100.0,
            followup_fan: 100.0,
            followup_speed_factor: 0.5,
            timeout_ms: 5_000,
            parallel: true,
        }
    }
}

impl Configuration {
    /// Validates the bounds §3/§4.3.5 mandate rejecting a configuration over, without
    /// reference to any particular bridge region.
    pub fn validate(&self) -> Result<(), PlannerError> {
        reject_if_not_positive!(self, arc_width);
        reject_if_not_positive!(self, r_min);
        reject_if_not_positive!(self, r_max);
        reject_if_not_positive!(self, angular_step);

        if self.r_min > self.r_max {
            return Err(PlannerError::ConfigRadiusBoundsInverted {
                r_min: self.r_min,
                r_max: self.r_max,
            });
        }

        if self.extend_arcs_into_perimeter < 0.5 * self.arc_width {
            return Err(PlannerError::ConfigLessThanOrEqualToZero {
                setting: "extend_arcs_into_perimeter".to_string(),
                value: self.extend_arcs_into_perimeter,
            });
        }

        Ok(())
    }

    /// Loads the sidecar override file next to `motion_file_path`, if any, and applies it on
    /// top of [`Configuration::default`]. Absence of the sidecar is not an error.
    pub fn load_for_motion_file(motion_file_path: &Path) -> Result<Configuration, PlannerError> {
        let sidecar = motion_file_path.with_extension("arcoverhang.cfg");

        let mut config = Configuration::default();

        if sidecar.exists() {
            let text = std::fs::read_to_string(&sidecar).map_err(|_| {
                PlannerError::SidecarFileUnreadable {
                    path: sidecar.display().to_string(),
                }
            })?;

            apply_overrides(&mut config, &text, &sidecar.display().to_string())?;
        }

        config.validate()?;

        Ok(config)
    }
}

fn apply_overrides(config: &mut Configuration, text: &str, path: &str) -> Result<(), PlannerError> {
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| PlannerError::SidecarFileMalformed {
            path: path.to_string(),
            line: line_no + 1,
        })?;

        let key = key.trim();
        let value = value.trim();

        let malformed = || PlannerError::SidecarFileMalformed {
            path: path.to_string(),
            line: line_no + 1,
        };

        match key {
            "arc_width" => config.arc_width = value.parse().map_err(|_| malformed())?,
            "r_min" => config.r_min = value.parse().map_err(|_| malformed())?,
            "r_max" => config.r_max = value.parse().map_err(|_| malformed())?,
            "arc_center_offset" => config.arc_center_offset = value.parse().map_err(|_| malformed())?,
            "extend_arcs_into_perimeter" => {
                config.extend_arcs_into_perimeter = value.parse().map_err(|_| malformed())?
            }
            "max_distance_from_perimeter" => {
                config.max_distance_from_perimeter = value.parse().map_err(|_| malformed())?
            }
            "min_bridge_area" => config.min_bridge_area = value.parse().map_err(|_| malformed())?,
            "min_bridge_length" => config.min_bridge_length = value.parse().map_err(|_| malformed())?,
            "use_least_center_points" => {
                config.use_least_center_points = value.parse().map_err(|_| malformed())?
            }
            "angular_step" => config.angular_step = value.parse().map_err(|_| malformed())?,
            "arc_feedrate" => config.arc_feedrate = value.parse().map_err(|_| malformed())?,
            "arc_temperature" => config.arc_temperature = Some(value.parse().map_err(|_| malformed())?),
            "arc_fan" => config.arc_fan = value.parse().map_err(|_| malformed())?,
            "followup_fan" => config.followup_fan = value.parse().map_err(|_| malformed())?,
            "followup_speed_factor" => {
                config.followup_speed_factor = value.parse().map_err(|_| malformed())?
            }
            "timeout_ms" => config.timeout_ms = value.parse().map_err(|_| malformed())?,
            "parallel" => config.parallel = value.parse().map_err(|_| malformed())?,
            _ => return Err(malformed()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn inverted_radius_bounds_rejected() {
        let config = Configuration {
            r_min: 9.0,
            r_max: 8.0,
            ..Configuration::default()
        };

        assert!(matches!(
            config.validate(),
            Err(PlannerError::ConfigRadiusBoundsInverted { .. })
        ));
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let mut config = Configuration::default();
        apply_overrides(&mut config, "arc_width = 0.6\nr_max=10\n", "test.cfg").unwrap();

        assert_eq!(config.arc_width, 0.6);
        assert_eq!(config.r_max, 10.0);
        assert_eq!(config.r_min, Configuration::default().r_min);
    }

    #[test]
    fn malformed_override_line_reported() {
        let mut config = Configuration::default();
        let err = apply_overrides(&mut config, "not a key value line\n", "test.cfg").unwrap_err();

        assert!(matches!(err, PlannerError::SidecarFileMalformed { line: 1, .. }));
    }
}
