//! NullSink: consumes images and counts them.

use crate::error::{KernelError, Result};
use crate::pipeline::module::{ModuleContext, ModuleHooks, ModuleInfo};
use crate::pipeline::slot::SlotDescriptor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static SLOTS: &[SlotDescriptor] = &[SlotDescriptor::input("in", "Input", "image to discard")];

pub struct NullSink {
    frames: Arc<AtomicU64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of frames consumed, readable from any thread.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.frames.clone()
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHooks for NullSink {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "NullSink",
            display_name: "Null sink",
            version: "1.0",
            short_description: "Discards images",
            long_description: "Locks its input once per frame and counts the images it sees.",
        }
    }

    fn slots(&self) -> &[SlotDescriptor] {
        SLOTS
    }

    fn init(&mut self, _ctx: &ModuleContext) -> Result<()> {
        self.frames.store(0, Ordering::Release);
        Ok(())
    }

    fn process(&mut self, ctx: &ModuleContext, _frame: u64) -> Result<()> {
        let input = ctx.input("in")?;
        if !input.lock()?.is_some() {
            return Err(KernelError::InvalidImageSlot(format!(
                "{} holds no image",
                input.qualified_name()
            )));
        }
        self.frames.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn reset(&mut self, _ctx: &ModuleContext) -> Result<()> {
        self.frames.store(0, Ordering::Release);
        Ok(())
    }
}
