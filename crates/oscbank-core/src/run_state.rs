//! Shared continuation flag for the serving loop

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Stopping,
}

/// Cloneable handle on the process-wide run state.
///
/// Starts `Running`. Once `Stopping` it never goes back.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    stopping: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        if self.stopping.load(Ordering::Acquire) {
            RunStatus::Stopping
        } else {
            RunStatus::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == RunStatus::Running
    }

    /// Move to `Stopping`. Returns true for the call that made the transition.
    pub fn request_stop(&self) -> bool {
        !self.stopping.swap(true, Ordering::AcqRel)
    }
}
