//! Session error types.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur in session token handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The token text does not match the session token grammar.
    #[error("malformed session token: {token:?}")]
    MalformedToken {
        /// The offending token text.
        token: String,
    },
}
