//! Media surface seam
//!
//! The surface is the platform decoder/renderer. The session drives it with
//! [`SurfaceCommand`]s and is fed back [`SurfaceEvent`]s; nothing else about
//! the playback component leaks into the session.

use crate::{error::Error, types::SubtitleTrack};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

/// Command issued by the session to the surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SurfaceCommand {
    /// Assign a new source and start at the given position
    SetSource { url: Url, start_at: f64 },
    Seek { position: f64 },
    SetPaused { paused: bool },
    SetRate { rate: f64 },
    SelectTextTrack { track: Option<SubtitleTrack> },
    /// Drop the source and stop decoding
    Release,
}

/// Sink for surface commands
pub trait MediaSurface {
    fn apply(&mut self, command: SurfaceCommand);
}

/// Records commands in order; handy for headless hosts and tests
impl MediaSurface for Vec<SurfaceCommand> {
    fn apply(&mut self, command: SurfaceCommand) {
        self.push(command);
    }
}

/// Forwards commands to the UI thread that owns the real player
impl MediaSurface for mpsc::UnboundedSender<SurfaceCommand> {
    fn apply(&mut self, command: SurfaceCommand) {
        if self.send(command).is_err() {
            warn!("Media surface receiver dropped, command discarded");
        }
    }
}

/// Callback delivered by the surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// Media loaded, duration known
    Loaded { duration: f64 },
    /// Periodic position report
    Progress { current_time: f64 },
    /// Decoder or network failure
    Error(PlaybackIssue),
    /// Reached the end of the media
    Ended,
}

/// Raw error as reported by the playback component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackIssue {
    /// Component-specific error code
    pub code: Option<i64>,
    /// HTTP status of the failed media request, when the component exposes it
    pub http_status: Option<u16>,
    pub message: String,
}

impl PlaybackIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Reclassify into the error taxonomy.
    ///
    /// Access-denied signatures (HTTP 401/403 or a message saying so) become
    /// [`Error::StreamAccessDenied`]; anything else is
    /// [`Error::PlaybackFailed`].
    pub fn classify(&self) -> Error {
        if matches!(self.http_status, Some(401) | Some(403)) {
            return Error::StreamAccessDenied;
        }

        let message = self.message.to_ascii_lowercase();
        // Status codes only count as whole tokens ("HTTP 403", not "14031")
        let status_token = message
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == "401" || token == "403");
        let denied = status_token
            || ["forbidden", "access denied", "unauthorized"]
                .iter()
                .any(|phrase| message.contains(phrase));
        if denied {
            return Error::StreamAccessDenied;
        }

        let reason = match (self.message.trim(), self.code) {
            ("", Some(code)) => format!("error code {code}"),
            ("", None) => "unknown error".to_string(),
            (msg, _) => msg.to_string(),
        };
        Error::PlaybackFailed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_403_is_access_denied() {
        let issue = PlaybackIssue::new("Source error").with_http_status(403);
        assert!(matches!(issue.classify(), Error::StreamAccessDenied));
    }

    #[test]
    fn test_message_signature_is_access_denied() {
        let issue = PlaybackIssue::new("Response code: 403 Forbidden").with_code(-11800);
        assert!(matches!(issue.classify(), Error::StreamAccessDenied));
    }

    #[test]
    fn test_status_digits_inside_numbers_are_not_access_denied() {
        let issue = PlaybackIssue::new("Decoder failed on segment 14031");
        assert!(matches!(issue.classify(), Error::PlaybackFailed(_)));

        let issue = PlaybackIssue::new("bitrate 4010 kbps unsupported");
        assert!(matches!(issue.classify(), Error::PlaybackFailed(_)));

        let issue = PlaybackIssue::new("HTTP/1.1 401");
        assert!(matches!(issue.classify(), Error::StreamAccessDenied));
    }

    #[test]
    fn test_unknown_error_is_playback_failed() {
        let issue = PlaybackIssue::new("Decoder init failed").with_http_status(200);
        assert!(matches!(issue.classify(), Error::PlaybackFailed(ref r) if r == "Decoder init failed"));

        let issue = PlaybackIssue::default().with_code(22);
        assert!(matches!(issue.classify(), Error::PlaybackFailed(ref r) if r == "error code 22"));
    }

    #[test]
    fn test_channel_surface_forwards() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.apply(SurfaceCommand::SetPaused { paused: true });
        assert_eq!(rx.try_recv().unwrap(), SurfaceCommand::SetPaused { paused: true });
    }
}
