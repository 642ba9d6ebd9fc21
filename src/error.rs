use thiserror::Error;

/// Failures reported by an [`InputDispatch`](crate::dispatch::InputDispatch) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The session was detached while a run still held its dispatcher.
    #[error("Target detached.")]
    Detached,

    /// The backend has no way to synthesize this character.
    #[error("Cannot type {0:?} with a US keyboard layout.")]
    Unsupported(char),

    /// The backend refused the event (connection, permission, focus, ...).
    #[error("{0}")]
    Rejected(String),
}

impl DispatchError {
    pub fn rejected(message: impl Into<String>) -> Self {
        DispatchError::Rejected(message.into())
    }
}

/// Errors surfaced by the scheduler and the control surface.
///
/// The `Display` text is what the control surface reports to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypingError {
    #[error("Not attached. Attach to the target first.")]
    NotAttached,

    #[error("Already running.")]
    AlreadyRunning,

    #[error("No active target.")]
    NoActiveTarget,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
