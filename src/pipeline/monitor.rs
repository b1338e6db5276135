//! Monitors observe modules without taking part in the processing graph.
//!
//! Monitor callbacks run on the kernel worker thread right after the module
//! hook returns, so they must be quick: copy what is needed and release the
//! slot lock.

use crate::image::Image;
use crate::pipeline::slot::Slot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Notification delivered to monitors attached to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEvent {
    Initialized,
    Processed { frame: u64 },
    Reset,
}

/// Observer attached to a [`Module`](crate::pipeline::Module).
pub trait Monitor: Send + Sync {
    fn on_module_event(&self, module: &str, event: ModuleEvent);
}

/// Copies the image of one slot every time its module processes a frame.
pub struct FrameGrabber {
    slot: Arc<Slot>,
    latest: Mutex<Option<Image>>,
    frames_seen: AtomicU64,
    last_frame: AtomicU64,
}

impl FrameGrabber {
    /// Take a use on `slot` for the grabber's lifetime.
    pub fn new(slot: Arc<Slot>) -> Arc<Self> {
        slot.acquire_use();
        Arc::new(Self {
            slot,
            latest: Mutex::new(None),
            frames_seen: AtomicU64::new(0),
            last_frame: AtomicU64::new(0),
        })
    }

    /// The most recently grabbed image.
    pub fn latest(&self) -> Option<Image> {
        self.latest.lock().clone()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Acquire)
    }

    /// Index of the last frame grabbed.
    pub fn last_frame(&self) -> u64 {
        self.last_frame.load(Ordering::Acquire)
    }

    pub fn slot(&self) -> &Arc<Slot> {
        &self.slot
    }
}

impl Monitor for FrameGrabber {
    fn on_module_event(&self, module: &str, event: ModuleEvent) {
        match event {
            ModuleEvent::Processed { frame } => {
                let copy = match self.slot.lock() {
                    Ok(guard) => guard.clone(),
                    Err(e) => {
                        tracing::trace!("Grabber on '{}' skipped frame {}: {}", module, frame, e);
                        return;
                    }
                };
                *self.latest.lock() = copy;
                self.last_frame.store(frame, Ordering::Release);
                self.frames_seen.fetch_add(1, Ordering::AcqRel);
            }
            ModuleEvent::Reset => {
                *self.latest.lock() = None;
            }
            ModuleEvent::Initialized => {}
        }
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        self.slot.release_use();
    }
}
