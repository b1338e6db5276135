//! Lifecycle states shared by modules and the kernel, and the published
//! kernel state snapshot.

use crate::error::KernelError;
use serde::{Deserialize, Serialize};

/// Lifecycle of a module, and of the pipeline as a whole.
///
/// ```text
/// Uninitialized -> Initialized -> Started <-> Paused -> Stopped
///       ^                                                  |
///       +------------------------ reset -------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Initialized,
    Started,
    Paused,
    Stopped,
}

impl LifecycleState {
    /// Started or Paused: modules hold run-time resources.
    pub fn is_running(self) -> bool {
        matches!(self, LifecycleState::Started | LifecycleState::Paused)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "Uninitialized",
            LifecycleState::Initialized => "Initialized",
            LifecycleState::Started => "Started",
            LifecycleState::Paused => "Paused",
            LifecycleState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Immutable snapshot published by the kernel after every transition.
#[derive(Debug, Clone)]
pub struct KernelState {
    pub state: LifecycleState,
    /// Number of frames processed since the run began.
    pub frame: u64,
    /// Frame bound of the current run; 0 = unbounded.
    pub max_frames: u64,
    /// `Err` when the transition that produced this snapshot failed.
    pub outcome: Result<(), KernelError>,
}

impl KernelState {
    pub fn new(state: LifecycleState, frame: u64, max_frames: u64) -> Self {
        Self {
            state,
            frame,
            max_frames,
            outcome: Ok(()),
        }
    }

    pub fn with_error(mut self, error: KernelError) -> Self {
        self.outcome = Err(error);
        self
    }

    pub fn is_exception_raised(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn exception(&self) -> Option<&KernelError> {
        self.outcome.as_ref().err()
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new(LifecycleState::Uninitialized, 0, 0)
    }
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at frame {}", self.state, self.frame)?;
        if self.max_frames > 0 {
            write!(f, "/{}", self.max_frames)?;
        }
        if let Err(e) = &self.outcome {
            write!(f, " ({})", e)?;
        }
        Ok(())
    }
}
