//! Error types for Anistream Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for playback and gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Playback error types
#[derive(Error, Debug)]
pub enum Error {
    // Network errors
    #[error("No internet connection")]
    NetworkUnavailable,

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid response shape: {0}")]
    InvalidResponseShape(String),

    // Playback errors
    #[error("Stream access denied")]
    StreamAccessDenied,

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    // Caller errors
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid session state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cannot {operation} while session is {state}")]
    NotReady { state: String, operation: &'static str },
}

impl Error {
    /// Create a gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Error::Gateway(msg.into())
    }

    /// Create an invalid selection error
    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Error::InvalidSelection(msg.into())
    }

    /// Map a transport failure from reqwest onto the taxonomy
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::NetworkUnavailable
        } else if err.is_decode() {
            Error::InvalidResponseShape(err.to_string())
        } else {
            Error::Http(err)
        }
    }

    /// Returns true if the screen can recover from this error with a retry
    /// or a different server selection
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NetworkUnavailable
                | Error::Timeout
                | Error::Http(_)
                | Error::Gateway(_)
                | Error::InvalidResponseShape(_)
                | Error::StreamAccessDenied
                | Error::PlaybackFailed(_)
        )
    }

    /// Returns the error code for logs and the view model
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Error::Timeout => "TIMEOUT",
            Error::Http(_) => "HTTP",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Gateway(_) => "GATEWAY",
            Error::InvalidResponseShape(_) => "INVALID_RESPONSE",
            Error::StreamAccessDenied => "STREAM_ACCESS_DENIED",
            Error::PlaybackFailed(_) => "PLAYBACK_FAILED",
            Error::InvalidSelection(_) => "INVALID_SELECTION",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::NotReady { .. } => "NOT_READY",
        }
    }

    /// Human-readable message with actionable guidance for the error display
    pub fn user_message(&self) -> String {
        match self {
            Error::NetworkUnavailable => {
                "No internet connection. Check your network and retry.".to_string()
            }
            Error::Timeout => "The server took too long to respond. Please retry.".to_string(),
            Error::Gateway(msg) => msg.clone(),
            Error::InvalidResponseShape(_) => "Invalid stream response format".to_string(),
            Error::StreamAccessDenied => {
                "This stream refused access. Try a different server.".to_string()
            }
            Error::PlaybackFailed(reason) => format!("Playback failed: {reason}"),
            other => other.to_string(),
        }
    }
}

/// Serializable error description for the error display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.user_message(),
            recoverable: err.is_recoverable(),
        }
    }
}
