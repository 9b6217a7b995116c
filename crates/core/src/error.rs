/// Failure taxonomy for session and redirect operations.
///
/// Only authentication-flow failures ever reach a caller. Storage problems
/// are logged and degrade the session to anonymous; broadcast problems
/// degrade to single-context operation and are never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The operation is forbidden in the current state (caller bug).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Timeout or transport failure; persisted state is left unchanged.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Broadcast unavailable: {0}")]
    BroadcastUnavailable(String),

    /// The remote API answered but refused the request (GraphQL `errors`).
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// The remote API answered with a payload missing required fields.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl SessionError {
    /// Whether retrying the same call (with backoff) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}
