//! Session error handling
//!
//! Transient network failures never surface here: the session recovers from
//! them by reconnecting. What remains are input validation failures, which
//! are rejected before any network I/O, and using a session whose driver
//! has already shut down.

use thiserror::Error;

/// Errors returned by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Display name was empty or whitespace
    #[error("Display name cannot be empty. Set one with `sketchroom config set display_name <name>`.")]
    EmptyName,

    /// Chat message was empty or whitespace
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// The session driver is no longer running
    #[error("Session is no longer running")]
    SessionClosed,
}

impl SessionError {
    /// Check if this error was caused by user input
    pub fn is_validation(&self) -> bool {
        matches!(self, SessionError::EmptyName | SessionError::EmptyMessage)
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
