//! Core types for Anistream

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Audio track flavour offered by a streaming server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    /// Original audio with subtitles
    #[default]
    Sub,
    /// Dubbed audio
    Dub,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Sub => "sub",
            TrackType::Dub => "dub",
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sub" => Ok(TrackType::Sub),
            "dub" => Ok(TrackType::Dub),
            other => Err(Error::invalid_selection(format!("unknown track type '{other}'"))),
        }
    }
}

/// Playback speeds offered by the speed menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlaybackRate {
    #[serde(rename = "0.5x")]
    Half,
    #[serde(rename = "0.75x")]
    ThreeQuarters,
    #[default]
    #[serde(rename = "1x")]
    Normal,
    #[serde(rename = "1.25x")]
    OneAndQuarter,
    #[serde(rename = "1.5x")]
    OneAndHalf,
    #[serde(rename = "2x")]
    Double,
}

impl PlaybackRate {
    /// All rates in menu order
    pub const ALL: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    /// Rate multiplier handed to the media surface
    pub fn as_f64(&self) -> f64 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }

    /// Menu label, e.g. "1.25x"
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackRate::Half => "0.5x",
            PlaybackRate::ThreeQuarters => "0.75x",
            PlaybackRate::Normal => "1x",
            PlaybackRate::OneAndQuarter => "1.25x",
            PlaybackRate::OneAndHalf => "1.5x",
            PlaybackRate::Double => "2x",
        }
    }
}

impl TryFrom<f64> for PlaybackRate {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        PlaybackRate::ALL
            .into_iter()
            .find(|rate| (rate.as_f64() - value).abs() < f64::EPSILON)
            .ok_or_else(|| Error::invalid_selection(format!("unsupported playback rate {value}")))
    }
}

impl FromStr for PlaybackRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches(['x', 'X']);
        let value: f64 = trimmed
            .parse()
            .map_err(|_| Error::invalid_selection(format!("unsupported playback rate '{s}'")))?;
        PlaybackRate::try_from(value)
    }
}

impl std::fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Time range in seconds, used for intro and outro markers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The API reports a missing marker as `{start: 0, end: 0}`
    pub fn into_marker(self) -> Option<TimeWindow> {
        if self.end > self.start && self.end > 0.0 {
            Some(self)
        } else {
            None
        }
    }
}

/// Subtitle (or caption) file attached to a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Human-readable label, e.g. "English"
    pub label: String,
    /// Location of the WebVTT file
    pub uri: Url,
    /// Track kind as reported by the API ("captions", "subtitles")
    pub kind: String,
    /// Whether the API flagged this track as the default one
    pub is_default: bool,
}

/// One playable server for an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "serverName")]
    pub server_name: String,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    #[serde(default, deserialize_with = "string_or_number")]
    pub server_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub data_id: String,
}

impl ServerEntry {
    pub fn new(server_name: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            server_name: server_name.into(),
            track_type,
            server_id: String::new(),
            data_id: String::new(),
        }
    }

    /// Server names are compared case-insensitively ("HD-1" == "hd-1")
    pub fn matches(&self, name: &str, track_type: TrackType) -> bool {
        self.track_type == track_type && self.server_name.eq_ignore_ascii_case(name)
    }
}

/// Container of the resolved media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Hls,
    Mp4,
    Other,
}

impl MediaKind {
    pub fn from_api(kind: &str, url: &Url) -> Self {
        let kind = kind.to_ascii_lowercase();
        if kind == "hls" || url.path().to_ascii_lowercase().ends_with(".m3u8") {
            MediaKind::Hls
        } else if kind == "mp4" || url.path().to_ascii_lowercase().ends_with(".mp4") {
            MediaKind::Mp4
        } else {
            MediaKind::Other
        }
    }
}

/// A stream manifest resolved by the gateway for one server selection
#[derive(Debug, Clone, PartialEq)]
pub struct StreamManifest {
    /// Media URL handed to the surface
    pub source: Url,
    pub media_kind: MediaKind,
    /// Subtitle tracks, in API order
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub intro: Option<TimeWindow>,
    pub outro: Option<TimeWindow>,
    /// Every server offered for this episode
    pub servers: Vec<ServerEntry>,
    /// Server that produced `source`
    pub server_name: String,
    pub track_type: TrackType,
}

/// Parameters of a stream manifest request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelector {
    /// Opaque anime identifier, e.g. "naruto-shippuden-355"
    pub anime_id: String,
    /// Opaque episode identifier
    pub episode: Option<String>,
    pub server: String,
    pub track_type: TrackType,
}

impl StreamSelector {
    pub fn new(anime_id: impl Into<String>, server: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            anime_id: anime_id.into(),
            episode: None,
            server: server.into(),
            track_type,
        }
    }

    pub fn with_episode(mut self, episode: impl Into<String>) -> Self {
        self.episode = Some(episode.into());
        self
    }

    /// Same content, different server
    pub fn with_server(&self, server: impl Into<String>, track_type: TrackType) -> Self {
        Self {
            server: server.into(),
            track_type,
            ..self.clone()
        }
    }

    /// Query parameters for the stream endpoint
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("id", self.anime_id.clone())];
        if let Some(episode) = &self.episode {
            query.push(("ep", episode.clone()));
        }
        query.push(("server", self.server.clone()));
        query.push(("type", self.track_type.to_string()));
        query
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One selectable entry of the quality menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Menu label, e.g. "1080p"
    pub label: String,
    pub resolution: Option<Resolution>,
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    /// Variant playlist URL
    pub uri: Url,
}

/// Label of the adaptive (master playlist) quality entry
pub const AUTO_QUALITY: &str = "Auto";

/// Catalog details for one anime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogInfo {
    pub id: String,
    pub title: String,
    pub japanese_title: Option<String>,
    pub description: Option<String>,
    pub poster: Option<String>,
    pub show_type: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
}

/// One episode in an episode list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Episode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub episode_no: u32,
    pub title: String,
    pub japanese_title: Option<String>,
    pub filler: bool,
}

impl Episode {
    /// Episode key used by the stream endpoint: the `ep` value of ids like
    /// `"naruto-shippuden-355?ep=7882"`, or the whole id otherwise
    pub fn episode_key(&self) -> &str {
        self.id
            .split_once("?ep=")
            .map(|(_, ep)| ep.split('&').next().unwrap_or(ep))
            .unwrap_or(&self.id)
    }

    /// Matches either the full id or the bare episode key
    pub fn matches(&self, episode_id: &str) -> bool {
        self.id == episode_id || self.episode_key() == episode_id
    }
}

/// Episodes of one anime, in broadcast order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EpisodeList {
    pub total_episodes: u32,
    pub episodes: Vec<Episode>,
}

impl EpisodeList {
    /// Episode following the given episode id, if any
    pub fn next_after(&self, episode_id: &str) -> Option<&Episode> {
        let idx = self.episodes.iter().position(|e| e.matches(episode_id))?;
        self.episodes.get(idx + 1)
    }
}

/// Search hit or list entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimeSummary {
    pub id: String,
    pub title: String,
    pub poster: Option<String>,
    pub show_type: Option<String>,
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchPage {
    pub data: Vec<AnimeSummary>,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Episode release from the airing schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduledRelease {
    pub id: String,
    pub title: String,
    pub time: String,
    pub episode_no: Option<u32>,
}

/// Lifecycle state of a playback screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the stream manifest
    Loading,
    /// Manifest resolved, surface has a source
    Ready,
    /// Manifest fetch failed, retry available
    Error,
    /// Screen unmounted
    Terminated,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Loading, Ready) | (Loading, Error) |
            (Ready, Ready) | (Ready, Loading) |
            (Error, Loading) |
            (Loading, Terminated) | (Ready, Terminated) | (Error, Terminated)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Loading => write!(f, "loading"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Error => write!(f, "error"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Format a position for the progress bar, e.g. `83.4` -> `"1:23"`
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

/// Ids come back as strings from some endpoints and numbers from others
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}
