//! Player screen controller
//!
//! Wires one screen lifetime together: the playback session, the controls
//! overlay, the orientation lock and the gateway fetches. All state changes
//! happen on the task that drives [`PlayerScreen::next_event`] and
//! [`PlayerScreen::handle`]; fetches run as spawned tasks that post their
//! results back over a channel and are abandoned on unmount.

use crate::{
    config::PlayerConfig,
    controls::{ControlsEvent, ControlsVisibility},
    error::{Error, ErrorInfo},
    gateway::Gateway,
    orientation::{OrientationControl, OrientationGuard},
    session::{PlaybackSession, SessionSnapshot},
    surface::{MediaSurface, SurfaceEvent},
    types::*,
    Result,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result delivered to the screen's event loop
#[derive(Debug)]
pub enum ScreenEvent {
    ManifestLoaded {
        generation: u64,
        result: Result<StreamManifest>,
    },
    CatalogLoaded(Result<CatalogInfo>),
    EpisodesLoaded(Result<EpisodeList>),
    QualitiesLoaded {
        generation: u64,
        result: Result<Vec<QualityLevel>>,
    },
    Controls(ControlsEvent),
}

/// What the composition layer should render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ScreenView {
    /// Spinner until the manifest resolves
    Loading,
    /// Error message with retry and back actions
    Error {
        error: ErrorInfo,
        can_retry: bool,
        can_go_back: bool,
    },
    Ready {
        session: SessionSnapshot,
        controls_visible: bool,
        /// Overlay opacity in `[0, 1]`
        controls_opacity: f32,
        title: Option<String>,
        next_episode: Option<Episode>,
    },
    /// Unmounted
    Closed,
}

/// Controller for one playback screen instance
pub struct PlayerScreen<G: Gateway + 'static, S: MediaSurface> {
    gateway: Arc<G>,
    config: PlayerConfig,
    session: PlaybackSession<S>,
    controls: ControlsVisibility,
    controls_rx: mpsc::UnboundedReceiver<ControlsEvent>,
    orientation: OrientationGuard,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<ScreenEvent>,
    rx: mpsc::UnboundedReceiver<ScreenEvent>,
    catalog: Option<CatalogInfo>,
    episodes: Option<EpisodeList>,
    mounted: bool,
}

impl<G: Gateway + 'static, S: MediaSurface> PlayerScreen<G, S> {
    pub fn new(
        gateway: Arc<G>,
        selector: StreamSelector,
        surface: S,
        orientation: Arc<dyn OrientationControl>,
        config: PlayerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();

        Self {
            gateway,
            controls: ControlsVisibility::new(&config, controls_tx),
            controls_rx,
            config,
            session: PlaybackSession::new(selector, surface),
            orientation: OrientationGuard::new(orientation),
            cancel: CancellationToken::new(),
            tx,
            rx,
            catalog: None,
            episodes: None,
            mounted: false,
        }
    }

    /// Start the screen: lock orientation, show controls and fetch the
    /// manifest, catalog info and episode list concurrently.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(&mut self) {
        if self.mounted || self.session.state() == SessionState::Terminated {
            return;
        }
        self.mounted = true;

        if self.config.lock_landscape {
            self.orientation.acquire();
        }
        self.controls.show();

        let selector = self.session.selector().clone();
        info!(
            session_id = %self.session.id(),
            anime_id = %selector.anime_id,
            episode = ?selector.episode,
            "Player screen mounted"
        );

        self.spawn_manifest_fetch();

        let gateway = Arc::clone(&self.gateway);
        let anime_id = selector.anime_id.clone();
        self.spawn(async move { ScreenEvent::CatalogLoaded(gateway.fetch_catalog_info(&anime_id).await) });

        let gateway = Arc::clone(&self.gateway);
        let anime_id = selector.anime_id;
        self.spawn(async move { ScreenEvent::EpisodesLoaded(gateway.fetch_episode_list(&anime_id).await) });
    }

    /// Tear the screen down. Idempotent; in-flight fetches are abandoned.
    pub fn unmount(&mut self) {
        if !self.mounted && self.session.state() == SessionState::Terminated {
            return;
        }
        self.mounted = false;
        self.cancel.cancel();
        self.controls.cancel();
        self.session.terminate();
        self.orientation.release();
        info!(session_id = %self.session.id(), "Player screen unmounted");
    }

    /// Run `task` unless the screen unmounts first, posting its result
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ScreenEvent> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Fetch abandoned on unmount");
                }
                event = task => {
                    let _ = tx.send(event);
                }
            }
        });
    }

    fn spawn_manifest_fetch(&self) {
        let gateway = Arc::clone(&self.gateway);
        let selector = self.session.selector().clone();
        let generation = self.session.generation();
        debug!(generation, server = %selector.server, track_type = %selector.track_type, "Fetching stream manifest");

        self.spawn(async move {
            ScreenEvent::ManifestLoaded {
                generation,
                result: gateway.fetch_stream_manifest(&selector).await,
            }
        });
    }

    fn spawn_quality_fetch(&self) {
        let Some(master) = self.session.source_url().cloned() else {
            return;
        };
        let gateway = Arc::clone(&self.gateway);
        let generation = self.session.generation();

        self.spawn(async move {
            ScreenEvent::QualitiesLoaded {
                generation,
                result: gateway.fetch_quality_ladder(&master).await,
            }
        });
    }

    /// Wait for the next fetch result or controls countdown.
    ///
    /// Returns `None` once the screen is unmounted.
    pub async fn next_event(&mut self) -> Option<ScreenEvent> {
        if self.session.state() == SessionState::Terminated {
            return None;
        }
        tokio::select! {
            Some(event) = self.rx.recv() => Some(event),
            Some(event) = self.controls_rx.recv() => Some(ScreenEvent::Controls(event)),
            _ = self.cancel.cancelled() => None,
        }
    }

    /// Apply one event. Returns false when it was stale or arrived after
    /// unmount.
    pub fn handle(&mut self, event: ScreenEvent) -> bool {
        if self.session.state() == SessionState::Terminated {
            debug!(event = ?event, "Event after unmount discarded");
            return false;
        }

        match event {
            ScreenEvent::ManifestLoaded { generation, result } => {
                if !self.session.accepts(generation) {
                    debug!(generation, current = self.session.generation(), "Stale manifest discarded");
                    return false;
                }
                if let Err(err) = self.session.load(result) {
                    warn!(error = %err, "Manifest could not be applied");
                    return false;
                }
                if self.session.state() == SessionState::Ready
                    && self.config.load_quality_ladder
                    && self.session.media_kind() == Some(MediaKind::Hls)
                {
                    self.spawn_quality_fetch();
                }
                true
            }
            ScreenEvent::QualitiesLoaded { generation, result } => {
                if generation != self.session.generation() || self.session.state() != SessionState::Ready {
                    debug!(generation, "Stale quality ladder discarded");
                    return false;
                }
                match result {
                    Ok(levels) => self.session.set_qualities(levels),
                    Err(err) => warn!(error = %err, "Quality ladder unavailable, keeping Auto only"),
                }
                true
            }
            ScreenEvent::CatalogLoaded(result) => {
                match result {
                    Ok(info) => self.catalog = Some(info),
                    Err(err) => warn!(code = err.error_code(), error = %err, "Catalog info fetch failed"),
                }
                true
            }
            ScreenEvent::EpisodesLoaded(result) => {
                match result {
                    Ok(list) => self.episodes = Some(list),
                    Err(err) => warn!(code = err.error_code(), error = %err, "Episode list fetch failed"),
                }
                true
            }
            ScreenEvent::Controls(event) => self.controls.handle(event),
        }
    }

    /// Wait for and apply the next event; false once unmounted
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Process events until the session leaves `Loading`
    pub async fn wait_until_settled(&mut self) -> SessionState {
        while self.session.state() == SessionState::Loading {
            if !self.step().await {
                break;
            }
        }
        self.session.state()
    }

    /// Keep the overlay up after an accepted interaction
    fn interacted<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.controls.on_interaction();
        }
        result
    }

    pub fn toggle_pause(&mut self) -> Result<bool> {
        let result = self.session.toggle_pause();
        self.interacted(result)
    }

    pub fn seek(&mut self, target: f64) -> Result<f64> {
        let result = self.session.seek(target);
        self.interacted(result)
    }

    pub fn skip_forward(&mut self) -> Result<f64> {
        let result = self.session.skip_by(self.config.skip_step_secs);
        self.interacted(result)
    }

    pub fn skip_backward(&mut self) -> Result<f64> {
        let result = self.session.skip_by(-self.config.skip_step_secs);
        self.interacted(result)
    }

    pub fn skip_intro(&mut self) -> bool {
        let skipped = self.session.skip_intro();
        if skipped {
            self.controls.on_interaction();
        }
        skipped
    }

    pub fn skip_outro(&mut self) -> bool {
        let skipped = self.session.skip_outro();
        if skipped {
            self.controls.on_interaction();
        }
        skipped
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<PlaybackRate> {
        let result = self.session.set_rate(rate);
        self.interacted(result)
    }

    /// Switch server/track and re-fetch the manifest
    pub fn change_server(&mut self, name: &str, track_type: TrackType) -> Result<()> {
        self.session.change_server(name, track_type)?;
        self.controls.on_interaction();
        self.spawn_manifest_fetch();
        Ok(())
    }

    pub fn select_quality(&mut self, label: &str) -> Result<()> {
        let result = self.session.select_quality(label);
        self.interacted(result)
    }

    pub fn select_subtitle(&mut self, index: Option<usize>) -> Result<()> {
        let result = self.session.select_subtitle(index);
        self.interacted(result)
    }

    /// Re-issue the manifest fetch from the error display
    pub fn retry(&mut self) -> Result<()> {
        if !self.mounted {
            return Err(Error::NotReady {
                state: self.session.state().to_string(),
                operation: "retry",
            });
        }
        self.session.retry()?;
        self.spawn_manifest_fetch();
        Ok(())
    }

    /// Tap on the video area
    pub fn on_video_press(&mut self) {
        self.controls.on_toggle_press();
    }

    /// Forward a surface callback to the session
    pub fn on_surface_event(&mut self, event: SurfaceEvent) -> bool {
        self.session.handle_surface_event(event)
    }

    pub fn session(&self) -> &PlaybackSession<S> {
        &self.session
    }

    pub fn controls(&self) -> &ControlsVisibility {
        &self.controls
    }

    pub fn catalog(&self) -> Option<&CatalogInfo> {
        self.catalog.as_ref()
    }

    pub fn episodes(&self) -> Option<&EpisodeList> {
        self.episodes.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Episode after the one playing, once the episode list is known
    pub fn next_episode(&self) -> Option<&Episode> {
        let current = self.session.selector().episode.as_deref()?;
        self.episodes.as_ref()?.next_after(current)
    }

    pub fn view(&self) -> ScreenView {
        match self.session.state() {
            SessionState::Loading => ScreenView::Loading,
            SessionState::Error => {
                let error = self
                    .session
                    .load_error()
                    .map(ErrorInfo::from)
                    .unwrap_or_else(|| ErrorInfo::from(&Error::gateway("Unknown error")));
                ScreenView::Error {
                    can_retry: error.recoverable,
                    error,
                    can_go_back: true,
                }
            }
            SessionState::Ready => ScreenView::Ready {
                session: self.session.snapshot(),
                controls_visible: self.controls.is_visible(),
                controls_opacity: self.controls.fade_level(),
                title: self.catalog.as_ref().map(|c| c.title.clone()),
                next_episode: self.next_episode().cloned(),
            },
            SessionState::Terminated => ScreenView::Closed,
        }
    }
}

impl<G: Gateway + 'static, S: MediaSurface> Drop for PlayerScreen<G, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::{Orientation, SharedOrientation};
    use crate::surface::SurfaceCommand;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use url::Url;

    /// Gateway answering from fixed data
    struct FixedGateway {
        manifest: std::sync::Mutex<Vec<Result<StreamManifest>>>,
    }

    impl FixedGateway {
        fn new(responses: Vec<Result<StreamManifest>>) -> Arc<Self> {
            Arc::new(Self {
                manifest: std::sync::Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl Gateway for FixedGateway {
        async fn fetch_stream_manifest(&self, _selector: &StreamSelector) -> Result<StreamManifest> {
            let mut responses = self.manifest.lock().unwrap();
            if responses.is_empty() {
                Err(Error::NetworkUnavailable)
            } else {
                responses.remove(0)
            }
        }

        async fn fetch_catalog_info(&self, anime_id: &str) -> Result<CatalogInfo> {
            Ok(CatalogInfo {
                id: anime_id.to_string(),
                title: "Naruto Shippuden".into(),
                ..Default::default()
            })
        }

        async fn fetch_episode_list(&self, _anime_id: &str) -> Result<EpisodeList> {
            Err(Error::Timeout)
        }

        async fn fetch_servers(&self, _anime_id: &str, _episode: &str) -> Result<Vec<ServerEntry>> {
            Ok(Vec::new())
        }

        async fn search(&self, _keyword: &str, _page: u32) -> Result<SearchPage> {
            Ok(SearchPage::default())
        }

        async fn fetch_schedule(&self, _date: NaiveDate) -> Result<Vec<ScheduledRelease>> {
            Ok(Vec::new())
        }
    }

    fn manifest() -> StreamManifest {
        StreamManifest {
            source: Url::parse("https://cdn.example.com/v.mp4").unwrap(),
            media_kind: MediaKind::Mp4,
            subtitle_tracks: Vec::new(),
            intro: None,
            outro: None,
            servers: vec![ServerEntry::new("HD-1", TrackType::Sub)],
            server_name: "HD-1".into(),
            track_type: TrackType::Sub,
        }
    }

    fn screen(
        gateway: Arc<FixedGateway>,
        orientation: &SharedOrientation,
    ) -> PlayerScreen<FixedGateway, Vec<SurfaceCommand>> {
        PlayerScreen::new(
            gateway,
            StreamSelector::new("naruto-shippuden-355", "hd-1", TrackType::Sub),
            Vec::new(),
            Arc::new(orientation.clone()),
            PlayerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_mount_loads_manifest() {
        let orientation = SharedOrientation::new();
        let mut screen = screen(FixedGateway::new(vec![Ok(manifest())]), &orientation);
        assert_eq!(screen.view(), ScreenView::Loading);

        screen.mount();
        assert_eq!(orientation.current(), Orientation::Landscape);
        assert_eq!(screen.wait_until_settled().await, SessionState::Ready);
        assert!(matches!(screen.view(), ScreenView::Ready { controls_visible: true, .. }));
    }

    #[tokio::test]
    async fn test_failure_then_retry() {
        let orientation = SharedOrientation::new();
        let gateway = FixedGateway::new(vec![Err(Error::gateway("Stream failed")), Ok(manifest())]);
        let mut screen = screen(gateway, &orientation);
        screen.mount();

        assert_eq!(screen.wait_until_settled().await, SessionState::Error);
        match screen.view() {
            ScreenView::Error { error, can_retry, .. } => {
                assert_eq!(error.message, "Stream failed");
                assert!(can_retry);
            }
            other => panic!("unexpected view: {other:?}"),
        }

        screen.retry().unwrap();
        assert_eq!(screen.wait_until_settled().await, SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_interaction_keeps_controls_hidden() {
        let orientation = SharedOrientation::new();
        let mut screen = screen(FixedGateway::new(vec![Ok(manifest())]), &orientation);
        screen.mount();
        screen.wait_until_settled().await;

        while screen.controls().is_visible() {
            assert!(screen.step().await);
        }

        assert!(screen.set_rate(3.0).is_err());
        assert!(screen.change_server("HD-2", TrackType::Dub).is_err());
        assert!(!screen.controls().is_visible());
        assert!(!screen.controls().has_pending_countdown());

        assert_eq!(screen.set_rate(1.5).unwrap(), PlaybackRate::OneAndHalf);
        assert!(screen.controls().is_visible());
        assert!(screen.controls().has_pending_countdown());
    }

    #[tokio::test]
    async fn test_unmount_releases_everything() {
        let orientation = SharedOrientation::new();
        let mut screen = screen(FixedGateway::new(vec![Ok(manifest())]), &orientation);
        screen.mount();
        screen.unmount();
        screen.unmount();

        assert_eq!(orientation.current(), Orientation::Unlocked);
        assert_eq!(screen.view(), ScreenView::Closed);
        assert!(!screen.controls().has_pending_countdown());
        assert!(screen.next_event().await.is_none());
        assert!(!screen.handle(ScreenEvent::ManifestLoaded {
            generation: 0,
            result: Ok(manifest()),
        }));
    }
}
