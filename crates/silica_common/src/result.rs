//! Internal-error type for invariant violations.

/// An internal error indicating a bug in Silica, not a user input problem.
///
/// These errors should never occur during normal operation. If one does
/// occur, it means an invariant of the circuit graph or the simulator was
/// violated by the library itself.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
