use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level config document: a `programs` mapping.
#[derive(Debug, Deserialize, Default)]
pub struct RawDocument {
    pub programs: Option<BTreeMap<String, RawProgram>>,
}

/// One program entry before validation/defaulting. Every field is
/// optional here; `taskmaster_core::ProgramSpec` carries the defaults.
/// Unknown YAML keys are ignored.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawProgram {
    pub cmd: Option<String>,
    pub numprocs: Option<i64>,
    pub umask: Option<UmaskValue>,
    pub workingdir: Option<String>,
    pub autostart: Option<bool>,
    pub autorestart: Option<String>,
    pub exitcodes: Option<ExitCodesValue>,
    pub startretries: Option<i64>,
    pub starttime: Option<i64>,
    pub stopsignal: Option<String>,
    pub stoptime: Option<i64>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for RawProgram {
    fn default() -> Self {
        RawProgram {
            cmd: None,
            numprocs: None,
            umask: None,
            workingdir: None,
            autostart: None,
            autorestart: None,
            exitcodes: None,
            startretries: None,
            starttime: None,
            stopsignal: None,
            stoptime: None,
            stdout: None,
            stderr: None,
            env: BTreeMap::new(),
        }
    }
}

/// `umask` accepts either an integer or an octal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UmaskValue {
    Int(i64),
    Str(String),
}

/// `exitcodes` accepts a single integer or an array of integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExitCodesValue {
    One(i64),
    Many(Vec<i64>),
}

impl ExitCodesValue {
    pub fn into_vec(self) -> Vec<i64> {
        match self {
            ExitCodesValue::One(v) => vec![v],
            ExitCodesValue::Many(v) => v,
        }
    }
}
