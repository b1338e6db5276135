//! Test module builders
//!
//! `RecorderBuilder` produces modules whose hooks append to a shared
//! [`Journal`], so tests can assert on the exact order of lifecycle calls.

use frameflow::image::{Depth, Image};
use frameflow::pipeline::{
    Module, ModuleContext, ModuleHooks, ModuleId, ModuleInfo, SlotDescriptor,
};
use frameflow::{KernelError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One recorded hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub label: String,
    pub hook: &'static str,
    pub frame: Option<u64>,
}

/// Shared, ordered log of hook invocations
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, label: &str, hook: &'static str, frame: Option<u64>) {
        self.calls.lock().push(Call {
            label: label.to_string(),
            hook,
            frame,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// `(label, frame)` of every process call, in order.
    pub fn processed(&self) -> Vec<(String, u64)> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.hook == "process")
            .filter_map(|c| c.frame.map(|f| (c.label.clone(), f)))
            .collect()
    }

    /// Labels that received `hook`, in call order.
    pub fn labels_for(&self, hook: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.hook == hook)
            .map(|c| c.label.clone())
            .collect()
    }

    pub fn count(&self, label: &str, hook: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.label == label && c.hook == hook)
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Slot layout of a recorder module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// outputs `out`, `aux`
    Source,
    /// input `in`; outputs `out`, `aux`
    Filter,
    /// input `in`
    Sink,
    /// inputs `in0`..`in3`; output `out`
    Merge,
}

static SOURCE_SLOTS: &[SlotDescriptor] = &[
    SlotDescriptor::output("out", "Output", ""),
    SlotDescriptor::output("aux", "Auxiliary output", ""),
];

static FILTER_SLOTS: &[SlotDescriptor] = &[
    SlotDescriptor::input("in", "Input", ""),
    SlotDescriptor::output("out", "Output", ""),
    SlotDescriptor::output("aux", "Auxiliary output", ""),
];

static SINK_SLOTS: &[SlotDescriptor] = &[SlotDescriptor::input("in", "Input", "")];

static MERGE_SLOTS: &[SlotDescriptor] = &[
    SlotDescriptor::input("in0", "Input 0", ""),
    SlotDescriptor::input("in1", "Input 1", ""),
    SlotDescriptor::input("in2", "Input 2", ""),
    SlotDescriptor::input("in3", "Input 3", ""),
    SlotDescriptor::output("out", "Output", ""),
];

static NEXT_ID: AtomicU32 = AtomicU32::new(10_000);

pub struct RecorderBuilder {
    label: String,
    shape: Shape,
    max_frames: u64,
    fail_init: bool,
    fail_start: bool,
    fail_process_at: Option<u64>,
    panic_process_at: Option<u64>,
}

impl RecorderBuilder {
    pub fn new(label: &str, shape: Shape) -> Self {
        Self {
            label: label.to_string(),
            shape,
            max_frames: 0,
            fail_init: false,
            fail_start: false,
            fail_process_at: None,
            panic_process_at: None,
        }
    }

    pub fn max_frames(mut self, frames: u64) -> Self {
        self.max_frames = frames;
        self
    }

    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fail_process_at(mut self, frame: u64) -> Self {
        self.fail_process_at = Some(frame);
        self
    }

    pub fn panic_process_at(mut self, frame: u64) -> Self {
        self.panic_process_at = Some(frame);
        self
    }

    pub fn build(self, journal: &Journal) -> Arc<Module> {
        let id = ModuleId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let hooks = Recorder {
            journal: journal.clone(),
            shape: self.shape,
            max_frames: self.max_frames,
            fail_init: self.fail_init,
            fail_start: self.fail_start,
            fail_process_at: self.fail_process_at,
            panic_process_at: self.panic_process_at,
        };
        Module::new(id, self.label, Box::new(hooks)).expect("recorder slots are unique")
    }
}

struct Recorder {
    journal: Journal,
    shape: Shape,
    max_frames: u64,
    fail_init: bool,
    fail_start: bool,
    fail_process_at: Option<u64>,
    panic_process_at: Option<u64>,
}

impl ModuleHooks for Recorder {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "Recorder",
            display_name: "Recorder",
            version: "test",
            short_description: "records hook calls",
            long_description: "",
        }
    }

    fn slots(&self) -> &[SlotDescriptor] {
        match self.shape {
            Shape::Source => SOURCE_SLOTS,
            Shape::Filter => FILTER_SLOTS,
            Shape::Sink => SINK_SLOTS,
            Shape::Merge => MERGE_SLOTS,
        }
    }

    fn init(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.journal.record(ctx.label(), "init", None);
        if self.fail_init {
            return Err(KernelError::Undefined(format!("{} refused to init", ctx.label())));
        }
        Ok(())
    }

    fn start(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.journal.record(ctx.label(), "start", None);
        if self.fail_start {
            return Err(KernelError::Undefined(format!("{} refused to start", ctx.label())));
        }
        Ok(())
    }

    fn pause(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.journal.record(ctx.label(), "pause", None);
        Ok(())
    }

    fn process(&mut self, ctx: &ModuleContext, frame: u64) -> Result<()> {
        self.journal.record(ctx.label(), "process", Some(frame));
        if self.fail_process_at == Some(frame) {
            return Err(KernelError::UseModule {
                module: ctx.label().to_string(),
                message: format!("failed on frame {}", frame),
            });
        }
        if self.panic_process_at == Some(frame) {
            panic!("{} blew up on frame {}", ctx.label(), frame);
        }
        for input in ctx.inputs().iter().filter(|s| s.is_connected()) {
            drop(input.lock()?);
        }
        for output in ctx.outputs() {
            output.set_image(Image::new(1, 1, Depth::U8, 1)?)?;
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.journal.record(ctx.label(), "stop", None);
        Ok(())
    }

    fn reset(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.journal.record(ctx.label(), "reset", None);
        Ok(())
    }

    fn max_frames(&self) -> u64 {
        self.max_frames
    }
}
