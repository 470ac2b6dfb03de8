//! Shared types for the taskmaster process supervisor.
//!
//! Program Spec, Instance State, Signal, and the validation error types
//! sit here with no I/O dependency so both the config loader and the
//! supervision engine can share one definition of "what a program is".

mod error;
mod instance;
mod signal;
mod spec;

pub use error::SpecError;
pub use instance::{Instance, InstanceStatus};
pub use signal::{Signal, UnknownSignalName};
pub use spec::{AutoRestart, ProgramSpec};
