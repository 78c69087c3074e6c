use thiserror::Error;

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to allocate the PTY or spawn the child
    #[error("failed to spawn session: {0}")]
    SpawnFailed(String),
    /// Failed to write to the PTY
    #[error("failed to write to session: {0}")]
    WriteFailed(String),
    /// Failed to resize the PTY
    #[error("failed to resize session: {0}")]
    ResizeFailed(String),
    /// The session actor is no longer reachable
    #[error("session channel error: {0}")]
    Channel(String),
}
