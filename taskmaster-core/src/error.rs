/// Errors produced while validating a loaded configuration document into
/// a table of [`crate::ProgramSpec`]s.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpecError {
    #[error("program '{0}' must have a non-empty 'cmd'")]
    EmptyCmd(String),

    #[error("program '{0}': numprocs must be >= 1, got {1}")]
    InvalidNumProcs(String, i64),

    #[error("program '{0}': invalid umask '{1}'")]
    InvalidUmask(String, String),

    #[error("program '{0}': {1}")]
    InvalidSignal(String, #[source] crate::signal::UnknownSignalName),

    #[error("program '{0}': invalid autorestart policy '{1}' (expected always, never, or unexpected)")]
    InvalidAutoRestart(String, String),

    #[error("program '{0}': exit code {1} out of range 0-255")]
    InvalidExitCode(String, i64),
}
