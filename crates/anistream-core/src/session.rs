//! Playback Session - single source of truth for the media surface
//!
//! Holds what the surface should be rendering and at which position and rate:
//! - Manifest loading into the `Loading -> Ready | Error` state machine
//! - Seeking, relative skips, intro/outro skips
//! - Pause, rate, quality, server and subtitle selection
//! - Surface callbacks (load, progress, error)
//!
//! The session owns its surface, so no two sessions can drive the same one.

use crate::{
    error::{Error, ErrorInfo},
    surface::{MediaSurface, SurfaceCommand, SurfaceEvent},
    types::*,
    Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Playback state for one screen instance
pub struct PlaybackSession<S: MediaSurface> {
    id: SessionId,
    state: SessionState,
    /// Request that produced (or is producing) the current manifest
    selector: StreamSelector,
    /// Bumped whenever a new manifest fetch starts or the session ends
    generation: u64,
    surface: S,

    source_url: Option<Url>,
    /// Adaptive playlist, the "Auto" quality
    master_url: Option<Url>,
    media_kind: Option<MediaKind>,
    current_time: f64,
    duration: f64,
    is_paused: bool,
    playback_rate: PlaybackRate,
    selected_quality: String,
    selected_server_name: String,
    selected_track_type: TrackType,
    intro_window: Option<TimeWindow>,
    outro_window: Option<TimeWindow>,
    subtitle_tracks: Vec<SubtitleTrack>,
    selected_subtitle: Option<usize>,
    servers: Vec<ServerEntry>,
    qualities: Vec<QualityLevel>,

    /// Why the last manifest fetch failed
    load_error: Option<Error>,
    /// Last classified surface failure while ready
    playback_error: Option<Error>,
}

impl<S: MediaSurface> PlaybackSession<S> {
    /// Create a session waiting for the manifest of `selector`
    pub fn new(selector: StreamSelector, surface: S) -> Self {
        let id = SessionId::new();
        info!(session_id = %id, anime_id = %selector.anime_id, server = %selector.server, "Session created");

        Self {
            id,
            state: SessionState::Loading,
            selected_server_name: selector.server.clone(),
            selected_track_type: selector.track_type,
            selector,
            generation: 0,
            surface,
            source_url: None,
            master_url: None,
            media_kind: None,
            current_time: 0.0,
            duration: 0.0,
            is_paused: false,
            playback_rate: PlaybackRate::Normal,
            selected_quality: AUTO_QUALITY.to_string(),
            intro_window: None,
            outro_window: None,
            subtitle_tracks: Vec::new(),
            selected_subtitle: None,
            servers: Vec::new(),
            qualities: Vec::new(),
            load_error: None,
            playback_error: None,
        }
    }

    /// Transition to new state
    fn set_state(&mut self, new_state: SessionState) -> Result<()> {
        let current = self.state;

        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        self.state = new_state;
        if current != new_state {
            info!(session_id = %self.id, from = %current, to = %new_state, "State transition");
        }

        Ok(())
    }

    fn ensure_ready(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(Error::NotReady {
                state: self.state.to_string(),
                operation,
            })
        }
    }

    /// Whether a manifest response for `generation` should still be applied
    pub fn accepts(&self, generation: u64) -> bool {
        self.state == SessionState::Loading && generation == self.generation
    }

    /// Apply the manifest fetch result.
    ///
    /// On success the session becomes `Ready` and the surface receives the
    /// new source. On failure the session becomes `Error` and keeps no stream
    /// data from the failed selection.
    #[instrument(skip(self, result), fields(session_id = %self.id))]
    pub fn load(&mut self, result: Result<StreamManifest>) -> Result<()> {
        if self.state != SessionState::Loading {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: "ready".to_string(),
            });
        }

        match result {
            Ok(manifest) => self.apply_manifest(manifest),
            Err(err) => {
                warn!(code = err.error_code(), error = %err, "Manifest fetch failed");
                // A server change leaves the previous source on the surface
                if self.source_url.is_some() {
                    self.surface.apply(SurfaceCommand::Release);
                }
                self.clear_stream();
                self.load_error = Some(err);
                self.set_state(SessionState::Error)
            }
        }
    }

    fn apply_manifest(&mut self, manifest: StreamManifest) -> Result<()> {
        let active = manifest
            .servers
            .iter()
            .filter(|s| s.matches(&manifest.server_name, manifest.track_type))
            .count();
        if !manifest.servers.is_empty() && active != 1 {
            warn!(
                server = %manifest.server_name,
                track_type = %manifest.track_type,
                matches = active,
                "Active server is not listed exactly once"
            );
        }

        let resume_at = self.current_time;
        self.selected_server_name = manifest.server_name;
        self.selected_track_type = manifest.track_type;
        self.source_url = Some(manifest.source.clone());
        self.master_url = Some(manifest.source.clone());
        self.media_kind = Some(manifest.media_kind);
        self.intro_window = manifest.intro;
        self.outro_window = manifest.outro;
        self.selected_subtitle = default_subtitle(&manifest.subtitle_tracks);
        self.subtitle_tracks = manifest.subtitle_tracks;
        self.servers = manifest.servers;
        self.qualities.clear();
        self.selected_quality = AUTO_QUALITY.to_string();
        self.duration = 0.0;
        self.load_error = None;
        self.playback_error = None;

        self.set_state(SessionState::Ready)?;

        self.surface.apply(SurfaceCommand::SetSource {
            url: manifest.source,
            start_at: resume_at,
        });
        self.surface.apply(SurfaceCommand::SetRate {
            rate: self.playback_rate.as_f64(),
        });
        self.surface.apply(SurfaceCommand::SetPaused { paused: self.is_paused });
        self.surface.apply(SurfaceCommand::SelectTextTrack {
            track: self.selected_subtitle_track().cloned(),
        });

        info!(
            server = %self.selected_server_name,
            track_type = %self.selected_track_type,
            intro = self.intro_window.is_some(),
            outro = self.outro_window.is_some(),
            subtitles = self.subtitle_tracks.len(),
            "Session ready"
        );

        Ok(())
    }

    fn clear_stream(&mut self) {
        self.source_url = None;
        self.master_url = None;
        self.media_kind = None;
        self.duration = 0.0;
        self.intro_window = None;
        self.outro_window = None;
        self.subtitle_tracks.clear();
        self.selected_subtitle = None;
        self.servers.clear();
        self.qualities.clear();
        self.selected_quality = AUTO_QUALITY.to_string();
        self.playback_error = None;
    }

    fn clamp_position(&self, target: f64) -> f64 {
        if target.is_nan() {
            return self.current_time;
        }
        let clamped = if self.duration > 0.0 {
            target.clamp(0.0, self.duration)
        } else {
            // Duration unknown: only the lower bound applies
            target.max(0.0)
        };
        if clamped.is_finite() {
            clamped
        } else {
            self.current_time
        }
    }

    /// Seek to an absolute position, clamped to the media bounds
    pub fn seek(&mut self, target: f64) -> Result<f64> {
        self.ensure_ready("seek")?;

        let clamped = self.clamp_position(target);
        debug!(from = self.current_time, to = clamped, "Seeking");

        self.surface.apply(SurfaceCommand::Seek { position: clamped });
        // Optimistic; the next progress report is authoritative
        self.current_time = clamped;

        Ok(clamped)
    }

    /// Seek relative to the current position
    pub fn skip_by(&mut self, delta: f64) -> Result<f64> {
        self.seek(self.current_time + delta)
    }

    /// Jump to the end of the intro. Only acts while inside the intro window.
    pub fn skip_intro(&mut self) -> bool {
        match self.intro_window {
            Some(window) if self.state == SessionState::Ready && window.contains(self.current_time) => {
                info!(to = window.end, "Skipping intro");
                self.seek(window.end).is_ok()
            }
            _ => false,
        }
    }

    /// Jump to the end of the outro. Only acts while inside the outro window.
    pub fn skip_outro(&mut self) -> bool {
        match self.outro_window {
            Some(window) if self.state == SessionState::Ready && window.contains(self.current_time) => {
                info!(to = window.end, "Skipping outro");
                self.seek(window.end).is_ok()
            }
            _ => false,
        }
    }

    /// Flip pause; returns the new pause state
    pub fn toggle_pause(&mut self) -> Result<bool> {
        self.set_paused(!self.is_paused)?;
        Ok(self.is_paused)
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.ensure_ready("pause")?;
        self.is_paused = paused;
        self.surface.apply(SurfaceCommand::SetPaused { paused });
        Ok(())
    }

    /// Change playback speed. Rates outside the menu are rejected untouched.
    pub fn set_rate(&mut self, rate: f64) -> Result<PlaybackRate> {
        if self.state == SessionState::Terminated {
            return Err(Error::NotReady {
                state: self.state.to_string(),
                operation: "set rate",
            });
        }
        let rate = PlaybackRate::try_from(rate)?;
        self.playback_rate = rate;
        if self.state == SessionState::Ready {
            self.surface.apply(SurfaceCommand::SetRate { rate: rate.as_f64() });
        }
        debug!(rate = %rate, "Playback rate changed");
        Ok(rate)
    }

    /// Switch to another server/track pair.
    ///
    /// Returns the selector to fetch; the session waits in `Loading` until the
    /// new manifest is applied with [`load`](Self::load).
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn change_server(&mut self, name: &str, track_type: TrackType) -> Result<StreamSelector> {
        if self.state == SessionState::Terminated || self.state == SessionState::Loading {
            return Err(Error::NotReady {
                state: self.state.to_string(),
                operation: "change server",
            });
        }

        let entry = self
            .servers
            .iter()
            .find(|s| s.matches(name, track_type))
            .ok_or_else(|| Error::invalid_selection(format!("server not found: {name}/{track_type}")))?;

        let selector = self.selector.with_server(entry.server_name.clone(), track_type);
        self.set_state(SessionState::Loading)?;
        self.generation += 1;
        self.selector = selector.clone();
        self.playback_error = None;

        info!(server = %selector.server, track_type = %track_type, generation = self.generation, "Server change requested");
        Ok(selector)
    }

    /// Re-issue the failed manifest fetch
    pub fn retry(&mut self) -> Result<StreamSelector> {
        if self.state != SessionState::Error {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: SessionState::Loading.to_string(),
            });
        }
        self.set_state(SessionState::Loading)?;
        self.generation += 1;
        self.load_error = None;
        Ok(self.selector.clone())
    }

    /// Install the quality ladder of the current source
    pub fn set_qualities(&mut self, levels: Vec<QualityLevel>) {
        if self.state != SessionState::Ready {
            return;
        }
        self.qualities = levels;
        if self.selected_quality != AUTO_QUALITY
            && !self.qualities.iter().any(|q| q.label == self.selected_quality)
        {
            self.selected_quality = AUTO_QUALITY.to_string();
        }
        debug!(levels = self.qualities.len(), "Quality ladder installed");
    }

    /// Pick a quality by label; "Auto" returns to the adaptive playlist
    pub fn select_quality(&mut self, label: &str) -> Result<()> {
        self.ensure_ready("select quality")?;

        let url = if label.eq_ignore_ascii_case(AUTO_QUALITY) {
            self.master_url
                .clone()
                .ok_or_else(|| Error::invalid_selection("no adaptive source"))?
        } else {
            self.qualities
                .iter()
                .find(|q| q.label.eq_ignore_ascii_case(label))
                .map(|q| q.uri.clone())
                .ok_or_else(|| Error::invalid_selection(format!("quality not available: {label}")))?
        };

        if self.source_url.as_ref() == Some(&url) {
            return Ok(());
        }

        let label = if label.eq_ignore_ascii_case(AUTO_QUALITY) {
            AUTO_QUALITY.to_string()
        } else {
            label.to_string()
        };
        info!(quality = %label, "Quality changed");

        self.selected_quality = label;
        self.source_url = Some(url.clone());
        self.playback_error = None;
        self.surface.apply(SurfaceCommand::SetSource {
            url,
            start_at: self.current_time,
        });
        Ok(())
    }

    /// Select a subtitle track by index, or turn subtitles off
    pub fn select_subtitle(&mut self, index: Option<usize>) -> Result<()> {
        self.ensure_ready("select subtitles")?;
        if let Some(idx) = index {
            if idx >= self.subtitle_tracks.len() {
                return Err(Error::invalid_selection(format!(
                    "subtitle track {idx} out of range ({} tracks)",
                    self.subtitle_tracks.len()
                )));
            }
        }
        self.selected_subtitle = index;
        self.surface.apply(SurfaceCommand::SelectTextTrack {
            track: self.selected_subtitle_track().cloned(),
        });
        Ok(())
    }

    /// Apply a surface callback. Returns false when the event was ignored.
    pub fn handle_surface_event(&mut self, event: SurfaceEvent) -> bool {
        if self.state != SessionState::Ready {
            debug!(state = %self.state, "Surface event ignored");
            return false;
        }

        match event {
            SurfaceEvent::Loaded { duration } => {
                if !(duration.is_finite() && duration >= 0.0) {
                    warn!(duration, "Surface reported invalid duration");
                    return false;
                }
                self.duration = duration;
                self.current_time = self.clamp_position(self.current_time);
                debug!(duration, "Media loaded");
            }
            SurfaceEvent::Progress { current_time } => {
                // Last write wins, including the first report after a seek
                self.current_time = self.clamp_position(current_time);
            }
            SurfaceEvent::Error(issue) => {
                let err = issue.classify();
                warn!(code = err.error_code(), error = %err, "Playback error");
                self.playback_error = Some(err);
            }
            SurfaceEvent::Ended => {
                self.is_paused = true;
                if self.duration > 0.0 {
                    self.current_time = self.duration;
                }
                debug!("Playback ended");
            }
        }
        true
    }

    /// End the session. Idempotent; later calls and events are ignored.
    pub fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        let transition = self.set_state(SessionState::Terminated);
        debug_assert!(transition.is_ok(), "terminate rejected from {}", self.state);
        self.generation += 1;
        self.surface.apply(SurfaceCommand::Release);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selector(&self) -> &StreamSelector {
        &self.selector
    }

    pub fn source_url(&self) -> Option<&Url> {
        self.source_url.as_ref()
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media_kind
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.playback_rate
    }

    pub fn selected_quality(&self) -> &str {
        &self.selected_quality
    }

    pub fn selected_server_name(&self) -> &str {
        &self.selected_server_name
    }

    pub fn selected_track_type(&self) -> TrackType {
        self.selected_track_type
    }

    pub fn intro_window(&self) -> Option<TimeWindow> {
        self.intro_window
    }

    pub fn outro_window(&self) -> Option<TimeWindow> {
        self.outro_window
    }

    pub fn subtitle_tracks(&self) -> &[SubtitleTrack] {
        &self.subtitle_tracks
    }

    pub fn selected_subtitle(&self) -> Option<usize> {
        self.selected_subtitle
    }

    pub fn selected_subtitle_track(&self) -> Option<&SubtitleTrack> {
        self.selected_subtitle.and_then(|idx| self.subtitle_tracks.get(idx))
    }

    pub fn servers(&self) -> &[ServerEntry] {
        &self.servers
    }

    pub fn qualities(&self) -> &[QualityLevel] {
        &self.qualities
    }

    pub fn load_error(&self) -> Option<&Error> {
        self.load_error.as_ref()
    }

    pub fn playback_error(&self) -> Option<&Error> {
        self.playback_error.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Position is inside the intro window
    pub fn in_intro(&self) -> bool {
        self.intro_window.is_some_and(|w| w.contains(self.current_time))
    }

    /// Position is inside the outro window
    pub fn in_outro(&self) -> bool {
        self.outro_window.is_some_and(|w| w.contains(self.current_time))
    }

    /// Progress bar fill in `[0, 1]`; 0 while duration is unknown
    pub fn progress_fraction(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Serializable view of the session for the overlay
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            source_url: self.source_url.as_ref().map(Url::to_string),
            current_time: self.current_time,
            duration: self.duration,
            is_paused: self.is_paused,
            playback_rate: self.playback_rate,
            selected_quality: self.selected_quality.clone(),
            selected_server_name: self.selected_server_name.clone(),
            selected_track_type: self.selected_track_type,
            intro_window: self.intro_window,
            outro_window: self.outro_window,
            in_intro: self.in_intro(),
            in_outro: self.in_outro(),
            subtitle_tracks: self.subtitle_tracks.clone(),
            selected_subtitle: self.selected_subtitle,
            servers: self.servers.clone(),
            qualities: std::iter::once(AUTO_QUALITY.to_string())
                .chain(self.qualities.iter().map(|q| q.label.clone()))
                .collect(),
            playback_error: self.playback_error.as_ref().map(ErrorInfo::from),
        }
    }
}

/// Track flagged default, else none
fn default_subtitle(tracks: &[SubtitleTrack]) -> Option<usize> {
    tracks.iter().position(|t| t.is_default)
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub source_url: Option<String>,
    pub current_time: f64,
    pub duration: f64,
    pub is_paused: bool,
    pub playback_rate: PlaybackRate,
    pub selected_quality: String,
    pub selected_server_name: String,
    pub selected_track_type: TrackType,
    pub intro_window: Option<TimeWindow>,
    pub outro_window: Option<TimeWindow>,
    pub in_intro: bool,
    pub in_outro: bool,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub selected_subtitle: Option<usize>,
    pub servers: Vec<ServerEntry>,
    /// Quality menu entries, "Auto" first
    pub qualities: Vec<String>,
    pub playback_error: Option<ErrorInfo>,
}
