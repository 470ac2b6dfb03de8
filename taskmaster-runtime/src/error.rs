/// Errors surfaced by [`crate::engine::SupervisionEngine`] operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    #[error("failed to reload configuration: {0}")]
    Reload(#[from] taskmaster_config::LoadError),
}

/// Failure spawning a child process, before or during fork/exec. One
/// variant regardless of where in the spawn path it occurred: the engine
/// treats it identically to an immediate abnormal exit.
#[derive(Debug, thiserror::Error)]
#[error("spawn failed for '{program}': {reason}")]
pub struct SpawnError {
    pub program: String,
    pub reason: String,
}
