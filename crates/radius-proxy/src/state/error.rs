//! Error types for state store operations

use std::fmt;

/// Errors raised by a state backend
///
/// A missing or unreadable entry is not an error; see `StateLookup`.
/// Everything here is transient from the caller's point of view and the
/// operation may be retried.
#[derive(Debug)]
pub enum StateError {
    /// Backend unreachable or refused the operation
    BackendError(String),

    /// Operation did not complete in time
    Timeout(String),

    /// A container could not be encoded for storage
    SerializationError(String),
}

impl StateError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StateError::SerializationError(_))
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::BackendError(msg) => write!(f, "Backend error: {}", msg),
            StateError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            StateError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StateError {}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::SerializationError(format!("JSON error: {}", err))
    }
}
