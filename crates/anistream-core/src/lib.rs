//! Anistream Core - Playback Screen Library for Anistream
//!
//! This crate provides the engineered core of the video playback screen:
//! - Stream manifest, catalog and episode fetching over the streaming API
//! - Playback session state (position, rate, server, quality, subtitles)
//! - Intro/outro skipping
//! - Auto-hiding control overlay with a single cancellable countdown
//! - Orientation lock and media surface seams
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Anistream Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Gateway    │  │   Controls   │  │ Orientation  │          │
//! │  │ (HTTP, HLS)  │  │  Visibility  │  │    Guard     │          │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘          │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Player    │                              │
//! │                    │   Screen    │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │                    ┌──────┴──────┐       ┌──────────────┐       │
//! │                    │  Playback   │──────▶│    Media     │       │
//! │                    │   Session   │◀──────│   Surface    │       │
//! │                    └─────────────┘       └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod gateway;
pub mod surface;
pub mod orientation;
pub mod controls;
pub mod session;
pub mod screen;

pub use error::{Error, ErrorInfo, Result};
pub use types::*;
pub use config::{GatewayConfig, PlayerConfig};
pub use gateway::{Gateway, HttpGateway};
pub use surface::{MediaSurface, PlaybackIssue, SurfaceCommand, SurfaceEvent};
pub use orientation::{Orientation, OrientationControl, OrientationGuard, SharedOrientation};
pub use controls::{ControlsEvent, ControlsVisibility, Countdown};
pub use session::{PlaybackSession, SessionSnapshot};
pub use screen::{PlayerScreen, ScreenEvent, ScreenView};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Anistream Core initialized");
}
