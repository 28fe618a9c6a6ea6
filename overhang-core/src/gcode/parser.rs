//! Line-oriented motion-program parser (§4.1 "motion program reader", §10.4).
//!
//! Recognizes just enough of the marlin/prusa G-code dialect to build the structured
//! [`MotionProgram`](crate::model::MotionProgram): `G0`/`G1` moves, `;LAYER_CHANGE` and `;Z:`
//! layer markers, and `;TYPE:` segment markers. Everything else is kept verbatim in
//! `MotionProgram::lines` but not otherwise interpreted.

use geo::{Coord, LineString};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, one_of, space0, space1},
    combinator::{opt, recognize},
    number::complete::double,
    sequence::{pair, preceded},
    IResult,
};

use crate::error::PlannerError;
use crate::model::{AmbientState, Layer, MotionProgram, Segment, SegmentKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    None,
}

/// One decoded `G0`/`G1` move, with only the axes/parameters we act on.
#[derive(Debug, Clone, Copy, Default)]
struct MoveWord {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    e: Option<f64>,
    f: Option<f64>,
    extruding: bool,
}

fn signed_number(input: &str) -> IResult<&str, f64> {
    double(input)
}

fn axis_word(letter: char) -> impl Fn(&str) -> IResult<&str, f64> {
    move |input: &str| preceded(char(letter), signed_number)(input)
}

fn move_line(input: &str) -> IResult<&str, MoveWord> {
    let (input, _) = alt((tag("G1"), tag("G0")))(input)?;
    let mut remainder = input;
    let mut word = MoveWord::default();

    loop {
        let trimmed = remainder.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            remainder = trimmed;
            break;
        }

        if let Ok((rest, v)) = axis_word('X')(trimmed) {
            word.x = Some(v);
            remainder = rest;
        } else if let Ok((rest, v)) = axis_word('Y')(trimmed) {
            word.y = Some(v);
            remainder = rest;
        } else if let Ok((rest, v)) = axis_word('Z')(trimmed) {
            word.z = Some(v);
            remainder = rest;
        } else if let Ok((rest, v)) = axis_word('E')(trimmed) {
            word.e = Some(v);
            word.extruding = v > 0.0;
            remainder = rest;
        } else if let Ok((rest, v)) = axis_word('F')(trimmed) {
            word.f = Some(v);
            remainder = rest;
        } else {
            break;
        }
    }

    Ok((remainder, word))
}

fn is_layer_change_marker(line: &str) -> bool {
    line.trim_start().starts_with(";LAYER_CHANGE")
}

fn parse_z_marker(line: &str) -> Option<f64> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix(";Z:")?;
    rest.trim().parse().ok()
}

fn parse_type_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed.strip_prefix(";TYPE:")
}

/// `M106 Sxxx` (fan on, PWM 0-255) or `M107` (fan off), returned as a percentage.
fn parse_fan_marker(line: &str) -> Option<f64> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("M106") {
        let pwm: f64 = rest.trim_start().strip_prefix('S')?.trim().parse().ok()?;
        return Some((pwm / 255.0 * 100.0).clamp(0.0, 100.0));
    }
    if trimmed.starts_with("M107") {
        return Some(0.0);
    }
    None
}

/// `M104 Sxxx`: sets the hotend target temperature without waiting.
fn parse_temperature_marker(line: &str) -> Option<f64> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("M104")?;
    rest.trim_start().strip_prefix('S')?.trim().parse().ok()
}

struct Cursor {
    pos: Coord<f64>,
    feedrate: f64,
    fan: f64,
    temperature: Option<f64>,
}

/// Parses `source` into a [`MotionProgram`].
///
/// Grammar: `;LAYER_CHANGE` opens a new [`Layer`]; the `;Z:` line immediately following sets
/// its height; `;TYPE:` lines open a new [`Segment`] of the named kind; `G0`/`G1` lines with a
/// positive `E` delta extend the current segment's path. Anything before the first
/// `;LAYER_CHANGE` is kept in `lines` but produces no layer.
pub fn parse(source: &str) -> Result<MotionProgram, PlannerError> {
    let lines: Vec<String> = source.lines().map(str::to_owned).collect();

    let mut layers: Vec<Layer> = Vec::new();
    let mut cursor = Cursor {
        pos: Coord { x: 0.0, y: 0.0 },
        feedrate: 0.0,
        fan: 0.0,
        temperature: None,
    };
    let mut current_kind = SegmentKind::Other;
    let mut current_path: Vec<Coord<f64>> = Vec::new();
    let mut current_segment_start = 0usize;
    let mut current_extrusion_per_mm = 0.0;
    let mut segment_ambient: Option<AmbientState> = None;

    macro_rules! flush_segment {
        ($layer:expr, $end_line:expr) => {
            if current_path.len() >= 2 {
                if let Some(layer) = $layer {
                    layer.segments.push(Segment {
                        kind: current_kind,
                        path: LineString::new(std::mem::take(&mut current_path)),
                        extrusion_per_mm: current_extrusion_per_mm,
                        feedrate: cursor.feedrate,
                        ambient_before: segment_ambient.unwrap_or(AmbientState {
                            fan: cursor.fan,
                            temperature: cursor.temperature,
                            feedrate: cursor.feedrate,
                        }),
                        line_range: current_segment_start..$end_line,
                    });
                }
            }
            current_path.clear();
            segment_ambient = None;
        };
    }

    for (idx, raw_line) in lines.iter().enumerate() {
        let line = raw_line.as_str();

        if is_layer_change_marker(line) {
            flush_segment!(layers.last_mut(), idx);
            if let Some(last) = layers.last_mut() {
                last.line_range.end = idx;
            }
            layers.push(Layer {
                index: layers.len(),
                z_height: 0.0,
                segments: Vec::new(),
                line_range: idx..lines.len(),
            });
            current_segment_start = idx + 1;
            continue;
        }

        if let Some(z) = parse_z_marker(line) {
            if let Some(last) = layers.last_mut() {
                last.z_height = z;
            }
            continue;
        }

        if let Some(marker) = parse_type_marker(line) {
            flush_segment!(layers.last_mut(), idx);
            current_kind = SegmentKind::from_type_marker(marker);
            current_segment_start = idx;
            continue;
        }

        if let Some(fan) = parse_fan_marker(line) {
            cursor.fan = fan;
            continue;
        }

        if let Some(temp) = parse_temperature_marker(line) {
            cursor.temperature = Some(temp);
            continue;
        }

        if line.trim_start().starts_with("G0") || line.trim_start().starts_with("G1") {
            match move_line(line.trim_start()) {
                Ok((rest, word)) => {
                    let leftover = rest.trim_start();
                    if !leftover.is_empty() && !leftover.starts_with(';') {
                        return Err(PlannerError::Parse {
                            line: idx + 1,
                            reason: format!("unrecognized token `{leftover}`"),
                        });
                    }

                    if let Some(f) = word.f {
                        cursor.feedrate = f;
                    }
                    let next = Coord {
                        x: word.x.unwrap_or(cursor.pos.x),
                        y: word.y.unwrap_or(cursor.pos.y),
                    };

                    if word.extruding {
                        if current_path.is_empty() {
                            current_path.push(cursor.pos);
                            segment_ambient = Some(AmbientState {
                                fan: cursor.fan,
                                temperature: cursor.temperature,
                                feedrate: cursor.feedrate,
                            });
                        }
                        let dx = next.x - cursor.pos.x;
                        let dy = next.y - cursor.pos.y;
                        let len = (dx * dx + dy * dy).sqrt();
                        if len > f64::EPSILON {
                            current_extrusion_per_mm = word.e.unwrap_or(0.0) / len;
                        }
                        current_path.push(next);
                    } else {
                        flush_segment!(layers.last_mut(), idx);
                        current_segment_start = idx + 1;
                    }

                    cursor.pos = next;
                }
                Err(_) => {
                    return Err(PlannerError::Parse {
                        line: idx + 1,
                        reason: "malformed G0/G1 move".to_string(),
                    });
                }
            }
        }
    }

    if let Some(last) = layers.last_mut() {
        flush_segment!(Some(last), lines.len());
        last.line_range.end = lines.len();
    }

    Ok(MotionProgram { lines, layers })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
;LAYER_CHANGE
;Z:0.2
G1 Z0.2 F600
;TYPE:External perimeter
G1 X0 Y0 F1200
G1 X10 Y0 E0.5
G1 X10 Y10 E0.5
;TYPE:Bridge infill
G1 X1 Y1 F1200
G1 X9 Y1 E0.4
G1 X9 Y9 E0.4
";

    #[test]
    fn parses_layers_and_segments() {
        let program = parse(SAMPLE).unwrap();
        assert_eq!(program.layers.len(), 1);
        let layer = &program.layers[0];
        assert_eq!(layer.z_height, 0.2);
        assert_eq!(layer.segments.len(), 2);
        assert_eq!(layer.segments[0].kind, SegmentKind::OuterPerimeter);
        assert_eq!(layer.segments[1].kind, SegmentKind::BridgeInfill);
    }

    #[test]
    fn round_trips_lines_verbatim() {
        let program = parse(SAMPLE).unwrap();
        assert_eq!(program.render(), SAMPLE);
    }

    #[test]
    fn rejects_malformed_move() {
        let bad = "G1 X0 Y0\nG1 XABC\n";
        assert!(matches!(parse(bad), Err(PlannerError::Parse { .. })));
    }
}
