//! YAML configuration loader and static validator for taskmaster program
//! specs. Produces a `BTreeMap<String, ProgramSpec>` the supervision
//! engine can install wholesale, either at boot or on `reload`.

mod raw;
mod validate;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use taskmaster_core::{ProgramSpec, SpecError};

pub use validate::warnings;

/// Errors encountered while loading a configuration document from disk.
///
/// Distinct from [`taskmaster_core::SpecError`]: this covers the I/O and
/// parse boundary; `SpecError` covers the per-program validation that
/// happens once the document has parsed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration is missing the top-level 'programs' mapping")]
    MissingProgramsKey,

    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Loads and validates a configuration file into a spec table.
///
/// All-or-nothing: any error here means the caller must keep its
/// previous state untouched.
pub fn load(path: &Path) -> Result<BTreeMap<String, ProgramSpec>, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let document: raw::RawDocument =
        serde_yaml::from_str(&content).map_err(|source| LoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    let programs = document.programs.ok_or(LoadError::MissingProgramsKey)?;

    let mut specs = BTreeMap::new();
    for (name, raw_program) in programs {
        let spec = validate::validate_program(&name, raw_program)?;
        specs.insert(name, spec);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskmaster.yaml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_minimal_valid_config() {
        let (_dir, path) = write_config(
            "programs:\n  nginx:\n    cmd: \"/usr/sbin/nginx\"\n    autostart: true\n",
        );
        let specs = load(&path).unwrap();
        assert_eq!(specs.len(), 1);
        assert!(specs["nginx"].autostart);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load(Path::new("/nonexistent/taskmaster.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let (_dir, path) = write_config("programs: [this is not a mapping");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn missing_programs_key_is_reported() {
        let (_dir, path) = write_config("other_key: 1\n");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, LoadError::MissingProgramsKey));
    }

    #[test]
    fn missing_cmd_surfaces_spec_error() {
        let (_dir, path) = write_config("programs:\n  broken:\n    numprocs: 2\n");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Spec(SpecError::EmptyCmd(_))));
    }

    #[test]
    fn reload_of_identical_file_produces_identical_table() {
        let (_dir, path) = write_config(
            "programs:\n  web:\n    cmd: \"/bin/sleep 100\"\n    numprocs: 2\n    autostart: true\n",
        );
        let first = load(&path).unwrap();
        let second = load(&path).unwrap();
        assert_eq!(first, second);
    }
}
