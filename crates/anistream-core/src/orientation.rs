//! Screen orientation lock
//!
//! Orientation is process-wide: every screen shares one controller. A screen
//! holds the lock through an [`OrientationGuard`], which releases at most once.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Orientation currently enforced by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Orientation {
    /// Follows the device
    #[default]
    Unlocked,
    Landscape,
}

/// Platform orientation control
pub trait OrientationControl: Send + Sync {
    fn lock_landscape(&self);
    fn unlock_all(&self);
}

/// In-process orientation state, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct SharedOrientation {
    state: Arc<Mutex<Orientation>>,
}

impl SharedOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Orientation {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, orientation: Orientation) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = orientation;
    }
}

impl OrientationControl for SharedOrientation {
    fn lock_landscape(&self) {
        self.set(Orientation::Landscape);
    }

    fn unlock_all(&self) {
        self.set(Orientation::Unlocked);
    }
}

/// One screen's claim on the landscape lock
pub struct OrientationGuard {
    control: Arc<dyn OrientationControl>,
    held: bool,
}

impl OrientationGuard {
    pub fn new(control: Arc<dyn OrientationControl>) -> Self {
        Self { control, held: false }
    }

    /// Lock to landscape; no-op if already held
    pub fn acquire(&mut self) {
        if !self.held {
            self.control.lock_landscape();
            self.held = true;
            debug!("Orientation locked to landscape");
        }
    }

    /// Unlock; releasing when not held is a no-op
    pub fn release(&mut self) {
        if self.held {
            self.control.unlock_all();
            self.held = false;
            debug!("Orientation unlocked");
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for OrientationGuard {
    fn drop(&mut self) {
        self.release();
    }
}
