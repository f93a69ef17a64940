//! Control overlay visibility
//!
//! The overlay hides itself after a fixed idle period and comes back on any
//! interaction. Timing is driven by a single [`Countdown`]: starting a new
//! countdown aborts the previous one, so at most one is ever pending. Fired
//! countdowns are delivered as [`ControlsEvent`]s to the screen's event loop,
//! tagged with a generation so a late delivery cannot act twice.

use crate::config::PlayerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Fired countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlsEvent {
    /// Idle period elapsed, start hiding
    IdleElapsed { generation: u64 },
    /// Fade-out animation finished
    FadeOutFinished { generation: u64 },
}

impl ControlsEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ControlsEvent::IdleElapsed { generation } | ControlsEvent::FadeOutFinished { generation } => {
                *generation
            }
        }
    }
}

/// Cancellable one-shot timer posting an event to a channel.
///
/// Requires a tokio runtime when started. Dropping the countdown cancels it.
#[derive(Debug, Default)]
pub struct Countdown {
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start, replacing any pending countdown
    pub fn start<T: Send + 'static>(&mut self, after: Duration, tx: mpsc::UnboundedSender<T>, event: T) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(event);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Shown,
    Hiding,
    Hidden,
}

/// Opacity animation between two levels
#[derive(Debug, Clone, Copy)]
struct Fade {
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
}

impl Fade {
    fn settled(level: f32) -> Self {
        Self {
            from: level,
            to: level,
            started: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    fn level_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let t = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0);
        self.from + (self.to - self.from) * t
    }
}

/// Visibility state of the control overlay
#[derive(Debug)]
pub struct ControlsVisibility {
    phase: Phase,
    fade: Fade,
    idle_timeout: Duration,
    fade_duration: Duration,
    countdown: Countdown,
    generation: u64,
    tx: mpsc::UnboundedSender<ControlsEvent>,
}

impl ControlsVisibility {
    /// Overlay starts fully shown with no countdown running
    pub fn new(config: &PlayerConfig, tx: mpsc::UnboundedSender<ControlsEvent>) -> Self {
        Self {
            phase: Phase::Shown,
            fade: Fade::settled(1.0),
            idle_timeout: config.controls_idle_timeout(),
            fade_duration: config.controls_fade(),
            countdown: Countdown::new(),
            generation: 0,
            tx,
        }
    }

    /// Show the overlay and restart the idle countdown
    pub fn show(&mut self) {
        let now = Instant::now();
        self.phase = Phase::Shown;
        self.fade_to(1.0, now);
        self.generation += 1;
        self.countdown.start(
            self.idle_timeout,
            self.tx.clone(),
            ControlsEvent::IdleElapsed { generation: self.generation },
        );
        trace!(generation = self.generation, "Controls shown");
    }

    /// Fade the overlay out; it becomes invisible once the fade completes
    pub fn hide(&mut self) {
        if self.phase != Phase::Shown {
            return;
        }
        let now = Instant::now();
        self.phase = Phase::Hiding;
        self.fade_to(0.0, now);
        self.generation += 1;
        self.countdown.start(
            self.fade_duration,
            self.tx.clone(),
            ControlsEvent::FadeOutFinished { generation: self.generation },
        );
        trace!(generation = self.generation, "Controls hiding");
    }

    /// Any user action keeps the overlay up
    pub fn on_interaction(&mut self) {
        self.show();
    }

    /// Tap on the video surface
    pub fn on_toggle_press(&mut self) {
        if self.phase == Phase::Shown {
            self.hide();
        } else {
            self.show();
        }
    }

    /// Apply a fired countdown. Returns false for stale events.
    pub fn handle(&mut self, event: ControlsEvent) -> bool {
        if event.generation() != self.generation {
            trace!(event = ?event, current = self.generation, "Stale controls event ignored");
            return false;
        }
        match event {
            ControlsEvent::IdleElapsed { .. } => self.hide(),
            ControlsEvent::FadeOutFinished { .. } => {
                self.phase = Phase::Hidden;
                self.fade = Fade::settled(0.0);
            }
        }
        true
    }

    /// Release the countdown; pending events become stale
    pub fn cancel(&mut self) {
        self.countdown.cancel();
        self.generation += 1;
    }

    /// Whether the overlay is rendered at all (true while fading out)
    pub fn is_visible(&self) -> bool {
        self.phase != Phase::Hidden
    }

    pub fn is_hiding(&self) -> bool {
        self.phase == Phase::Hiding
    }

    /// Current opacity in `[0, 1]`
    pub fn fade_level(&self) -> f32 {
        self.fade_level_at(Instant::now())
    }

    pub fn fade_level_at(&self, now: Instant) -> f32 {
        self.fade.level_at(now).clamp(0.0, 1.0)
    }

    pub fn has_pending_countdown(&self) -> bool {
        self.countdown.is_pending()
    }

    fn fade_to(&mut self, target: f32, now: Instant) {
        self.fade = Fade {
            from: self.fade.level_at(now),
            to: target,
            started: now,
            duration: self.fade_duration,
        };
    }
}
