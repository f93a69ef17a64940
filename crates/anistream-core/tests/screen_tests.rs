//! Integration tests for the player screen lifecycle

use anistream_core::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use url::Url;

/// Scripted gateway; manifest calls can be held until released
struct ScriptedGateway {
    manifests: Mutex<Vec<Result<StreamManifest>>>,
    requested: Mutex<Vec<StreamSelector>>,
    gate: Option<Arc<Notify>>,
    catalog_calls: AtomicUsize,
}

impl ScriptedGateway {
    fn new(manifests: Vec<Result<StreamManifest>>) -> Self {
        Self {
            manifests: Mutex::new(manifests),
            requested: Mutex::new(Vec::new()),
            gate: None,
            catalog_calls: AtomicUsize::new(0),
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn fetch_stream_manifest(&self, selector: &StreamSelector) -> Result<StreamManifest> {
        self.requested.lock().unwrap().push(selector.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut manifests = self.manifests.lock().unwrap();
        if manifests.is_empty() {
            return Err(Error::NetworkUnavailable);
        }
        manifests.remove(0)
    }

    async fn fetch_catalog_info(&self, anime_id: &str) -> Result<CatalogInfo> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CatalogInfo {
            id: anime_id.to_string(),
            title: "Naruto Shippuden".into(),
            ..Default::default()
        })
    }

    async fn fetch_episode_list(&self, _anime_id: &str) -> Result<EpisodeList> {
        Ok(EpisodeList {
            total_episodes: 2,
            episodes: vec![
                Episode {
                    id: "naruto-shippuden-355?ep=7882".into(),
                    episode_no: 1,
                    title: "Homecoming".into(),
                    ..Default::default()
                },
                Episode {
                    id: "naruto-shippuden-355?ep=7883".into(),
                    episode_no: 2,
                    title: "The Akatsuki Makes Its Move".into(),
                    ..Default::default()
                },
            ],
        })
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

    async fn fetch_quality_ladder(&self, master: &Url) -> Result<Vec<QualityLevel>> {
        Ok(vec![QualityLevel {
            label: "720p".into(),
            resolution: Some(Resolution::new(1280, 720)),
            bandwidth: 2_800_000,
            uri: master.join("720/index.m3u8")?,
        }])
    }
}

fn manifest(track_type: TrackType) -> StreamManifest {
    StreamManifest {
        source: Url::parse("https://cdn.example.com/ep/master.m3u8").unwrap(),
        media_kind: MediaKind::Hls,
        subtitle_tracks: Vec::new(),
        intro: Some(TimeWindow::new(0.0, 85.0)),
        outro: None,
        servers: vec![
            ServerEntry::new("HD-1", TrackType::Sub),
            ServerEntry::new("HD-1", TrackType::Dub),
            ServerEntry::new("HD-2", TrackType::Sub),
        ],
        server_name: "HD-1".into(),
        track_type,
    }
}

fn screen(
    gateway: ScriptedGateway,
    orientation: &SharedOrientation,
) -> (Arc<ScriptedGateway>, PlayerScreen<ScriptedGateway, Vec<SurfaceCommand>>) {
    let gateway = Arc::new(gateway);
    let config = PlayerConfig::default();
    let selector = config.selector("naruto-shippuden-355", Some("7882"));
    let screen = PlayerScreen::new(
        Arc::clone(&gateway),
        selector,
        Vec::new(),
        Arc::new(orientation.clone()),
        config,
    );
    (gateway, screen)
}

/// Drain events already queued without waiting on timers
async fn settle(screen: &mut PlayerScreen<ScriptedGateway, Vec<SurfaceCommand>>) {
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), screen.next_event()).await {
        if matches!(event, ScreenEvent::Controls(_)) {
            continue;
        }
        screen.handle(event);
    }
}

#[tokio::test]
async fn test_mount_to_ready() {
    let orientation = SharedOrientation::new();
    let (gateway, mut screen) = screen(ScriptedGateway::new(vec![Ok(manifest(TrackType::Sub))]), &orientation);

    screen.mount();
    screen.mount();
    assert_eq!(screen.wait_until_settled().await, SessionState::Ready);
    settle(&mut screen).await;

    assert_eq!(gateway.requested.lock().unwrap().len(), 1);
    assert_eq!(gateway.catalog_calls.load(Ordering::SeqCst), 1);
    assert_eq!(orientation.current(), Orientation::Landscape);

    let session = screen.session();
    assert!(matches!(
        session.surface().first(),
        Some(SurfaceCommand::SetSource { url, .. }) if url.as_str() == "https://cdn.example.com/ep/master.m3u8"
    ));
    assert_eq!(session.qualities().len(), 1);
    assert_eq!(screen.catalog().unwrap().title, "Naruto Shippuden");
    assert_eq!(screen.next_episode().unwrap().id, "naruto-shippuden-355?ep=7883");

    match screen.view() {
        ScreenView::Ready { session, title, .. } => {
            assert_eq!(session.qualities, vec!["Auto", "720p"]);
            assert_eq!(title.as_deref(), Some("Naruto Shippuden"));
        }
        other => panic!("unexpected view: {other:?}"),
    }
}

#[tokio::test]
async fn test_gateway_failure_then_retry() {
    let orientation = SharedOrientation::new();
    let (_gateway, mut screen) = screen(
        ScriptedGateway::new(vec![Err(Error::NetworkUnavailable), Ok(manifest(TrackType::Sub))]),
        &orientation,
    );

    screen.mount();
    assert_eq!(screen.wait_until_settled().await, SessionState::Error);
    assert!(screen.session().surface().is_empty());
    assert!(matches!(
        screen.view(),
        ScreenView::Error { can_retry: true, can_go_back: true, .. }
    ));
    assert_err!(screen.seek(10.0));

    assert_ok!(screen.retry());
    assert_eq!(screen.wait_until_settled().await, SessionState::Ready);
}

#[tokio::test]
async fn test_unmount_discards_in_flight_manifest() {
    let orientation = SharedOrientation::new();
    let gate = Arc::new(Notify::new());
    let (gateway, mut screen) = screen(
        ScriptedGateway::new(vec![Ok(manifest(TrackType::Sub))]).gated(Arc::clone(&gate)),
        &orientation,
    );

    screen.mount();
    while gateway.requested.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    screen.unmount();
    gate.notify_waiters();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(screen.next_event().await.is_none());
    assert_eq!(screen.session().state(), SessionState::Terminated);
    assert!(!screen
        .session()
        .surface()
        .iter()
        .any(|c| matches!(c, SurfaceCommand::SetSource { .. })));
    assert_eq!(orientation.current(), Orientation::Unlocked);
}

#[tokio::test]
async fn test_change_server_refetches() {
    let orientation = SharedOrientation::new();
    let (gateway, mut screen) = screen(
        ScriptedGateway::new(vec![Ok(manifest(TrackType::Sub)), Ok(manifest(TrackType::Dub))]),
        &orientation,
    );

    screen.mount();
    screen.wait_until_settled().await;
    screen.on_surface_event(SurfaceEvent::Loaded { duration: 1420.0 });
    assert_ok!(screen.seek(300.0));

    let err = assert_err!(screen.change_server("HD-2", TrackType::Dub));
    assert!(matches!(err, Error::InvalidSelection(_)));
    assert_eq!(screen.session().state(), SessionState::Ready);

    assert_ok!(screen.change_server("HD-1", TrackType::Dub));
    assert_eq!(screen.view(), ScreenView::Loading);
    assert_eq!(screen.wait_until_settled().await, SessionState::Ready);

    let requested = gateway.requested.lock().unwrap();
    assert_eq!(requested.len(), 2);
    assert_eq!(requested[1].track_type, TrackType::Dub);
    assert_eq!(requested[1].episode.as_deref(), Some("7882"));
    drop(requested);

    assert_eq!(screen.session().selected_track_type(), TrackType::Dub);
    assert!(screen.session().surface().iter().any(|c| matches!(
        c,
        SurfaceCommand::SetSource { start_at, .. } if *start_at == 300.0
    )));
}

#[tokio::test]
async fn test_playback_interactions() {
    let orientation = SharedOrientation::new();
    let (_gateway, mut screen) = screen(ScriptedGateway::new(vec![Ok(manifest(TrackType::Sub))]), &orientation);

    screen.mount();
    screen.wait_until_settled().await;
    screen.on_surface_event(SurfaceEvent::Loaded { duration: 1420.0 });
    screen.on_surface_event(SurfaceEvent::Progress { current_time: 40.0 });

    assert!(screen.skip_intro());
    assert_eq!(screen.session().current_time(), 85.0);

    assert_eq!(assert_ok!(screen.skip_forward()), 95.0);
    assert!(!screen.skip_intro());
    assert_eq!(assert_ok!(screen.skip_backward()), 85.0);
    assert_eq!(assert_ok!(screen.set_rate(2.0)), PlaybackRate::Double);
    assert_err!(screen.set_rate(3.0));
    assert_eq!(screen.session().playback_rate(), PlaybackRate::Double);
    assert!(assert_ok!(screen.toggle_pause()));

    screen.on_surface_event(SurfaceEvent::Error(PlaybackIssue::new("HTTP 403 Forbidden")));
    match screen.view() {
        ScreenView::Ready { session, .. } => {
            let error = session.playback_error.unwrap();
            assert_eq!(error.code, "STREAM_ACCESS_DENIED");
            assert!(error.message.contains("different server"));
        }
        other => panic!("unexpected view: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_controls_auto_hide_on_screen() {
    let orientation = SharedOrientation::new();
    let (_gateway, mut screen) = screen(ScriptedGateway::new(vec![Ok(manifest(TrackType::Sub))]), &orientation);

    screen.mount();
    screen.wait_until_settled().await;
    assert!(screen.controls().is_visible());

    // Idle countdown, then fade
    while screen.controls().is_visible() {
        assert!(screen.step().await);
    }
    assert!(matches!(screen.view(), ScreenView::Ready { controls_visible: false, .. }));

    screen.on_video_press();
    assert!(screen.controls().is_visible());
    screen.unmount();
    assert!(!screen.controls().has_pending_countdown());
}
