use crate::capture::CaptureErrorKind;

/// Errors that end the current turn. None of them is fatal for the process
/// except `CaptureUnavailable`, which is raised before any turn exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Speech recognition is not available: {0}")]
    CaptureUnavailable(String),
    #[error("{0}")]
    Capture(CaptureErrorKind),
    #[error("Failed to connect to the gateway: {0}")]
    Connection(ConnectionError),
    /// Logged only; the turn carries on.
    #[error("Failed to parse gateway message: {0}")]
    Protocol(String),
    #[error("Please configure the gateway URL")]
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection timeout")]
    Timeout,
    #[error("{0}")]
    Failed(String),
    #[error("connection closed by the gateway")]
    Closed,
}

impl From<CaptureErrorKind> for SessionError {
    fn from(kind: CaptureErrorKind) -> Self {
        SessionError::Capture(kind)
    }
}

impl From<ConnectionError> for SessionError {
    fn from(error: ConnectionError) -> Self {
        SessionError::Connection(error)
    }
}
