//! Gateway and player configuration

use crate::{error::Error, types::{StreamSelector, TrackType}, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default base URL of the streaming API
pub const DEFAULT_API_BASE: &str = "http://localhost:4444/api/";

/// Remote data gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL all endpoint paths are joined onto
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// User agent sent with every request
    pub user_agent: String,
    /// Bearer token attached when present
    pub access_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            request_timeout_ms: 10_000,
            user_agent: format!("anistream/{}", crate::VERSION),
            access_token: None,
        }
    }
}

impl GatewayConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base URL with a trailing slash so relative joins keep the last segment
    pub fn base(&self) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?)
    }
}

/// Player screen configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Idle time before the control overlay hides (milliseconds)
    pub controls_idle_timeout_ms: u64,
    /// Fade in/out animation length (milliseconds)
    pub controls_fade_ms: u64,
    /// Step of the rewind/forward buttons (seconds)
    pub skip_step_secs: f64,
    /// Server requested on mount
    pub default_server: String,
    /// Track type requested on mount
    pub default_track_type: TrackType,
    /// Fetch the HLS quality ladder after the manifest resolves
    pub load_quality_ladder: bool,
    /// Lock orientation to landscape while mounted
    pub lock_landscape: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            controls_idle_timeout_ms: 3_000,
            controls_fade_ms: 300,
            skip_step_secs: 10.0,
            default_server: "hd-1".to_string(),
            default_track_type: TrackType::Sub,
            load_quality_ladder: true,
            lock_landscape: true,
        }
    }
}

impl PlayerConfig {
    pub fn controls_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.controls_idle_timeout_ms)
    }

    pub fn controls_fade(&self) -> Duration {
        Duration::from_millis(self.controls_fade_ms)
    }

    /// Initial selection for an episode, using the default server and track
    pub fn selector(&self, anime_id: impl Into<String>, episode: Option<&str>) -> StreamSelector {
        let selector = StreamSelector::new(anime_id, self.default_server.clone(), self.default_track_type);
        match episode {
            Some(ep) => selector.with_episode(ep),
            None => selector,
        }
    }

    /// Load from a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidResponseShape(format!("player config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controls_idle_timeout_ms == 0 {
            return Err(Error::invalid_selection("controls idle timeout must be non-zero"));
        }
        if !(self.skip_step_secs.is_finite() && self.skip_step_secs > 0.0) {
            return Err(Error::invalid_selection("skip step must be a positive number of seconds"));
        }
        Ok(())
    }
}
