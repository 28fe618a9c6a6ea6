//! `arc-overhang <path-to-motion-file>` — rewrites the file in place, replacing bridge-infill
//! regions with printable concentric arcs (§6.3).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use overhang_core::config::Configuration;
use overhang_core::error::PlannerError;
use overhang_core::{gcode, process};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FILE_NOT_FOUND: u8 = 2;
const EXIT_PARSE_FAILURE: u8 = 3;
const EXIT_NO_BRIDGE_REGIONS: u8 = 4;
const EXIT_ALL_REGIONS_REJECTED: u8 = 5;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path_arg) = args.next() else {
        eprintln!("usage: arc-overhang <path-to-motion-file>");
        return ExitCode::from(EXIT_FILE_NOT_FOUND);
    };

    ExitCode::from(run(Path::new(&path_arg)))
}

fn run(path: &Path) -> u8 {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) => {
            log::error!("could not read {}: {err}", path.display());
            return EXIT_FILE_NOT_FOUND;
        }
    };

    let program = match gcode::parser::parse(&source) {
        Ok(p) => p,
        Err(err) => {
            log::error!("{err}");
            return EXIT_PARSE_FAILURE;
        }
    };

    let config = match Configuration::load_for_motion_file(path) {
        Ok(c) => c,
        Err(err) => {
            log::error!("{err}");
            return EXIT_PARSE_FAILURE;
        }
    };

    let outcome = match process(program, &config) {
        Ok(o) => o,
        Err(err) => {
            log::error!("{err}");
            return EXIT_PARSE_FAILURE;
        }
    };

    for diagnostic in &outcome.diagnostics {
        log_diagnostic(diagnostic);
    }

    if outcome.patches.is_empty() {
        if outcome.diagnostics.is_empty() {
            log::warn!("no bridge regions found in {}", path.display());
            return EXIT_NO_BRIDGE_REGIONS;
        }
        log::warn!(
            "{} bridge region(s) found in {} but all were rejected",
            outcome.diagnostics.len(),
            path.display()
        );
        return EXIT_ALL_REGIONS_REJECTED;
    }

    if let Err(err) = write_atomically(path, &outcome.program.render()) {
        log::error!("failed to write {}: {err}", path.display());
        return EXIT_PARSE_FAILURE;
    }

    log::info!(
        "replaced {} bridge region(s) in {}",
        outcome.patches.len(),
        path.display()
    );

    for followup in &outcome.followups {
        log::info!(
            "layer {}: follow-up fan {:.0}%, speed factor {:.2} (not applied to infill; space-filling rewrite is out of scope)",
            followup.layer_index,
            followup.directive.fan,
            followup.directive.speed_factor
        );
    }

    EXIT_SUCCESS
}

fn log_diagnostic(err: &PlannerError) {
    if err.is_local() {
        log::warn!("{err}");
    } else {
        log::error!("{err}");
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`, so a crash mid-write
/// never leaves a truncated motion program behind.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path: PathBuf = path.with_extension("arcoverhang.tmp");

    {
        let mut tmp_file = std::fs::File::create(&tmp_path)?;
        tmp_file.write_all(contents.as_bytes())?;
        tmp_file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)
}
