use std::collections::BTreeSet;
use std::path::PathBuf;

use taskmaster_core::{AutoRestart, ProgramSpec, Signal, SpecError};

use crate::raw::{RawProgram, UmaskValue};

/// Default file-mode creation mask.
const DEFAULT_UMASK: u32 = 0o022;

/// Validates one raw program entry and fills in defaults for any field
/// the document left unset.
pub fn validate_program(name: &str, raw: RawProgram) -> Result<ProgramSpec, SpecError> {
    let cmd = raw.cmd.unwrap_or_default();
    if cmd.trim().is_empty() {
        return Err(SpecError::EmptyCmd(name.to_string()));
    }

    let numprocs_raw = raw.numprocs.unwrap_or(1);
    if numprocs_raw < 1 {
        return Err(SpecError::InvalidNumProcs(name.to_string(), numprocs_raw));
    }
    let numprocs = numprocs_raw as u32;

    let umask = match raw.umask {
        None => DEFAULT_UMASK,
        Some(UmaskValue::Int(v)) => validate_umask_range(name, v)?,
        Some(UmaskValue::Str(s)) => {
            let v = i64::from_str_radix(s.trim(), 8)
                .map_err(|_| SpecError::InvalidUmask(name.to_string(), s.clone()))?;
            validate_umask_range(name, v)?
        }
    };

    let workingdir = raw.workingdir.map(PathBuf::from);
    let autostart = raw.autostart.unwrap_or(false);

    let autorestart = match raw.autorestart.as_deref() {
        None => AutoRestart::Never,
        Some("always") => AutoRestart::Always,
        Some("never") => AutoRestart::Never,
        Some("unexpected") => AutoRestart::Unexpected,
        Some(other) => {
            return Err(SpecError::InvalidAutoRestart(
                name.to_string(),
                other.to_string(),
            ))
        }
    };

    let exitcodes: BTreeSet<i32> = match raw.exitcodes {
        None => [0].into_iter().collect(),
        Some(value) => {
            let mut set = BTreeSet::new();
            for code in value.into_vec() {
                if !(0..=255).contains(&code) {
                    return Err(SpecError::InvalidExitCode(name.to_string(), code));
                }
                set.insert(code as i32);
            }
            set
        }
    };

    let startretries = raw.startretries.unwrap_or(3).max(0) as u32;
    let starttime_secs = raw.starttime.unwrap_or(1).max(0) as u64;
    let stoptime_secs = raw.stoptime.unwrap_or(10).max(0) as u64;

    let stopsignal = match raw.stopsignal {
        None => Signal::Term,
        Some(s) => s
            .parse::<Signal>()
            .map_err(|e| SpecError::InvalidSignal(name.to_string(), e))?,
    };

    Ok(ProgramSpec {
        name: name.to_string(),
        cmd,
        numprocs,
        umask,
        workingdir,
        autostart,
        autorestart,
        exitcodes,
        startretries,
        starttime_secs,
        stopsignal,
        stoptime_secs,
        stdout: raw.stdout.map(PathBuf::from),
        stderr: raw.stderr.map(PathBuf::from),
        env: raw.env,
    })
}

fn validate_umask_range(name: &str, value: i64) -> Result<u32, SpecError> {
    if !(0..=0o777).contains(&value) {
        return Err(SpecError::InvalidUmask(name.to_string(), value.to_string()));
    }
    Ok(value as u32)
}

/// Non-blocking validation warnings.
///
/// These surface to the operator (`validate` shell command) but never
/// block a load.
pub fn warnings(spec: &ProgramSpec) -> Vec<String> {
    let mut warnings = Vec::new();
    if spec.numprocs > 50 {
        warnings.push(format!(
            "program '{}': numprocs={} is unusually high",
            spec.name, spec.numprocs
        ));
    }
    if spec.startretries > 20 {
        warnings.push(format!(
            "program '{}': startretries={} is unusually high",
            spec.name, spec.startretries
        ));
    }
    if spec.autorestart == AutoRestart::Always && spec.startretries == 0 {
        warnings.push(format!(
            "program '{}': autorestart=always with startretries=0 restarts exactly once",
            spec.name
        ));
    }
    warnings
}
