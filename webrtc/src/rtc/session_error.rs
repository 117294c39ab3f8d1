//! Error types for the signaling session and its connectivity engine.

use crate::ice::CandidateParseError;

use super::signaling_state::SignalingState;

/// Result type alias using [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while driving a signaling session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation is not allowed in the current phase.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SignalingState,
    },

    /// A session is already active; it must be reset first.
    #[error("a session is already active, reset it first")]
    AlreadyActive,

    /// No session has been initialized.
    #[error("no active session")]
    NoActiveSession,

    /// A remote payload failed to parse or lacks required fields.
    #[error("malformed session description: {0}")]
    MalformedDescription(String),

    /// The underlying connectivity engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A pending operation was cancelled by a reset.
    #[error("operation abandoned by session reset")]
    Abandoned,
}

/// Failures reported by the connectivity engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine (or one of its resources) could not be created.
    #[error("connectivity engine construction failed: {0}")]
    Construction(String),

    /// An engine operation failed.
    #[error("connectivity engine operation failed: {0}")]
    Operation(String),

    /// The engine was already closed.
    #[error("connectivity engine closed")]
    Closed,
}

impl From<CandidateParseError> for SessionError {
    fn from(err: CandidateParseError) -> Self {
        SessionError::MalformedDescription(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::MalformedDescription(err.to_string())
    }
}

impl SessionError {
    /// Sequencing errors: the caller invoked an operation out of phase order.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidState { .. }
                | SessionError::AlreadyActive
                | SessionError::NoActiveSession
        )
    }

    /// Resource failures abort the in-progress call.
    pub fn is_resource_failure(&self) -> bool {
        matches!(self, SessionError::Engine(EngineError::Construction(_)))
    }
}
