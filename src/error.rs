//! Unified session error model.
//! Every failure the guard can observe maps onto one `SessionError` variant with a
//! stable machine code, so the CLI and embedding front ends can branch on `code()`
//! without matching on message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Token shape or payload could not be decoded.
    #[error("{0}")]
    Decode(String),
    /// Token decoded but its `exp` is already in the past.
    #[error("token expired at {exp}")]
    Expired { exp: i64 },
    /// Request never produced an HTTP response (connect/DNS/TLS/body read).
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status.
    #[error("backend rejected request: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("{message}")]
    LoginFailed { message: String },
    #[error("token storage error: {0}")]
    Storage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub fn decode<S: Into<String>>(msg: S) -> Self { SessionError::Decode(msg.into()) }
    pub fn transport<S: Into<String>>(msg: S) -> Self { SessionError::Transport(msg.into()) }
    pub fn storage<S: Into<String>>(msg: S) -> Self { SessionError::Storage(msg.into()) }
    pub fn config<S: Into<String>>(msg: S) -> Self { SessionError::Config(msg.into()) }
    pub fn login_failed<S: Into<String>>(msg: S) -> Self { SessionError::LoginFailed { message: msg.into() } }

    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Decode(_) => "token_decode",
            SessionError::Expired { .. } => "token_expired",
            SessionError::Transport(_) => "transport",
            SessionError::Rejected { .. } => "rejected",
            SessionError::LoginFailed { .. } => "login_failed",
            SessionError::Storage(_) => "storage",
            SessionError::Config(_) => "config",
        }
    }

    /// Map to an HTTP-like status for front ends that report errors that way.
    pub fn status(&self) -> u16 {
        match self {
            SessionError::Decode(_) | SessionError::Expired { .. } => 401,
            SessionError::Transport(_) => 503,
            SessionError::Rejected { status, .. } => *status,
            SessionError::LoginFailed { .. } => 401,
            SessionError::Storage(_) => 500,
            SessionError::Config(_) => 400,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SessionError::Rejected { status: status.as_u16(), message: err.to_string() },
            None => SessionError::Transport(err.to_string()),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
