//! reqwest-backed gateway

use super::envelope::{decode, DataOr, StreamResults};
use super::Gateway;
use crate::{
    config::GatewayConfig,
    error::Error,
    types::*,
    Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Gateway talking to the streaming API over HTTP
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base: Url,
    access_token: Option<String>,
}

impl HttpGateway {
    /// Create a gateway with its own HTTP client
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::with_client(client, &config)
    }

    /// Create a gateway reusing an existing client
    pub fn with_client(client: Client, config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            client,
            base: config.base()?,
            access_token: config.access_token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    /// GET an endpoint and unwrap its envelope
    async fn get_envelope<T: DeserializeOwned>(
        &self,
        name: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let start = Instant::now();

        let mut request = self.client.get(url.clone()).query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Error::from_transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(Error::from_transport)?;

        debug!(
            endpoint = name,
            status = status.as_u16(),
            bytes = body.len(),
            duration_ms = start.elapsed().as_millis(),
            "Gateway response"
        );

        decode(name, status, &body).inspect_err(|e| {
            warn!(endpoint = name, url = %url, error = %e, "Gateway request failed");
        })
    }
}

/// Percent-encode an opaque id for use as a path segment
fn segment(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes()).collect()
}

#[async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self))]
    async fn fetch_stream_manifest(&self, selector: &StreamSelector) -> Result<StreamManifest> {
        let results: StreamResults = self.get_envelope("stream", "stream", &selector.query()).await?;
        let manifest = results.into_manifest(selector)?;

        info!(
            server = %manifest.server_name,
            track_type = %manifest.track_type,
            servers = manifest.servers.len(),
            subtitles = manifest.subtitle_tracks.len(),
            "Stream manifest resolved"
        );

        Ok(manifest)
    }

    #[instrument(skip(self))]
    async fn fetch_catalog_info(&self, anime_id: &str) -> Result<CatalogInfo> {
        let info: DataOr<CatalogInfo> = self
            .get_envelope("info", "info", &[("id", anime_id.to_string())])
            .await?;
        Ok(info.into_inner())
    }

    #[instrument(skip(self))]
    async fn fetch_episode_list(&self, anime_id: &str) -> Result<EpisodeList> {
        let path = format!("episodes/{}", segment(anime_id));
        self.get_envelope("episodes", &path, &[]).await
    }

    #[instrument(skip(self))]
    async fn fetch_servers(&self, anime_id: &str, episode: &str) -> Result<Vec<ServerEntry>> {
        let path = format!("servers/{}", segment(anime_id));
        self.get_envelope("servers", &path, &[("ep", episode.to_string())]).await
    }

    #[instrument(skip(self))]
    async fn search(&self, keyword: &str, page: u32) -> Result<SearchPage> {
        self.get_envelope(
            "search",
            "search",
            &[("keyword", keyword.to_string()), ("page", page.max(1).to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<ScheduledRelease>> {
        let releases: DataOr<Vec<ScheduledRelease>> = self
            .get_envelope("schedule", "schedule", &[("date", date.format("%Y-%m-%d").to_string())])
            .await?;
        Ok(releases.into_inner())
    }

    #[cfg(feature = "hls")]
    #[instrument(skip(self))]
    async fn fetch_quality_ladder(&self, master: &Url) -> Result<Vec<QualityLevel>> {
        let response = self
            .client
            .get(master.clone())
            .send()
            .await
            .map_err(Error::from_transport)?;

        match response.status() {
            status if status.is_success() => {}
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::UNAUTHORIZED => return Err(Error::StreamAccessDenied),
            status => {
                return Err(Error::Gateway(format!(
                    "playlist request failed (HTTP {})",
                    status.as_u16()
                )))
            }
        }

        let body = response.bytes().await.map_err(Error::from_transport)?;
        let levels = super::quality::parse_quality_ladder(&body, master)?;
        debug!(levels = levels.len(), "Quality ladder parsed");
        Ok(levels)
    }
}
