//! Error types for the home hub API client.
//!
//! # Design
//! The variants follow the cause of the failure rather than the HTTP status
//! alone. 404 and 500 get dedicated variants with fixed messages; any other
//! non-2xx response becomes `Application` when the server supplied a usable
//! message and `Http` otherwise. The `Display` output of every variant is the
//! user-facing message, so callers can show `err.to_string()` directly.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by `HubClient::parse_response` and the `HubApi` facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server returned 404 for `endpoint`.
    #[error("resource not found at {endpoint}")]
    NotFound { endpoint: String },

    /// The server returned 500. The body is ignored.
    #[error("server error while processing the request")]
    ServerError,

    /// Non-2xx response carrying a message: the JSON `error` field or the
    /// plain-text body.
    #[error("{message}")]
    Application { status: u16, message: String },

    /// Non-2xx response with nothing usable in the body.
    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// The round-trip itself failed or the body could not be read/parsed.
    /// The message is the underlying error's, unchanged.
    #[error("{0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A successful JSON value did not match the expected response type.
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ServerError,
    Application,
    Http,
    Transport,
    Client,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::ServerError => ErrorKind::ServerError,
            ApiError::Application { .. } => ErrorKind::Application,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Serialization(_) | ApiError::Decode(_) => ErrorKind::Client,
        }
    }

    /// HTTP status that caused the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::ServerError => Some(500),
            ApiError::Application { status, .. } | ApiError::Http { status } => Some(*status),
            _ => None,
        }
    }
}
