//! Remote data gateway for the streaming API

pub mod envelope;
mod http;
#[cfg(feature = "hls")]
pub mod quality;

pub use http::HttpGateway;

use crate::{types::*, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use url::Url;

/// Read-only access to the streaming API.
///
/// Calls are one-shot: implementations never retry, retrying is a caller
/// decision. Every call completes or fails within the configured timeout.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Resolve the stream for one server/track selection
    async fn fetch_stream_manifest(&self, selector: &StreamSelector) -> Result<StreamManifest>;

    /// Catalog details for an anime
    async fn fetch_catalog_info(&self, anime_id: &str) -> Result<CatalogInfo>;

    /// Episode list for an anime
    async fn fetch_episode_list(&self, anime_id: &str) -> Result<EpisodeList>;

    /// Servers available for one episode
    async fn fetch_servers(&self, anime_id: &str, episode: &str) -> Result<Vec<ServerEntry>>;

    /// Keyword search
    async fn search(&self, keyword: &str, page: u32) -> Result<SearchPage>;

    /// Releases airing on a given day
    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<ScheduledRelease>>;

    /// Quality levels of an HLS master playlist.
    ///
    /// Gateways that cannot inspect playlists offer only the adaptive entry.
    async fn fetch_quality_ladder(&self, _master: &Url) -> Result<Vec<QualityLevel>> {
        Ok(Vec::new())
    }
}
