//! Module abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`ModuleHooks` trait**: provided by each module implementation. It gives the
//!   static description, slots and parameters, and the lifecycle hooks.
//! - **`Module` struct**: the engine-side wrapper that owns the live slots,
//!   the parameter table, attached monitors and the lifecycle state, and
//!   guards every hook call with the state machine.
//!
//! Only the kernel worker thread calls lifecycle methods; observer threads
//! read slots, parameters and properties through their own locks.

use crate::error::{KernelError, Result};
use crate::pipeline::id::ModuleId;
use crate::pipeline::monitor::{ModuleEvent, Monitor};
use crate::pipeline::parameter::{Parameter, ParameterTable, ParameterValue};
use crate::pipeline::slot::{Slot, SlotDescriptor, SlotKind};
use crate::pipeline::state::LifecycleState;
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Static identity of a module kind.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Kind identifier, used by the factory.
    pub name: &'static str,
    pub display_name: &'static str,
    pub version: &'static str,
    pub short_description: &'static str,
    pub long_description: &'static str,
}

/// Context passed to module hooks.
pub struct ModuleContext<'a> {
    label: &'a str,
    inputs: &'a [Arc<Slot>],
    outputs: &'a [Arc<Slot>],
    parameters: &'a ParameterTable,
}

impl<'a> ModuleContext<'a> {
    pub fn label(&self) -> &str {
        self.label
    }

    pub fn inputs(&self) -> &[Arc<Slot>] {
        self.inputs
    }

    pub fn outputs(&self) -> &[Arc<Slot>] {
        self.outputs
    }

    pub fn input(&self, name: &str) -> Result<&Arc<Slot>> {
        self.inputs
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| KernelError::InvalidSlot(format!("{}.{} (no such input)", self.label, name)))
    }

    pub fn output(&self, name: &str) -> Result<&Arc<Slot>> {
        self.outputs
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| KernelError::InvalidSlot(format!("{}.{} (no such output)", self.label, name)))
    }

    pub fn parameters(&self) -> &ParameterTable {
        self.parameters
    }

    pub fn parameter(&self, name: &str) -> Result<&ParameterValue> {
        self.parameters
            .value(name)
            .ok_or_else(|| KernelError::invalid_parameter(self.label, name, "no such parameter"))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.parameter(name)?
            .as_int()
            .ok_or_else(|| KernelError::invalid_parameter(self.label, name, "not an int"))
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        self.parameter(name)?
            .as_float()
            .ok_or_else(|| KernelError::invalid_parameter(self.label, name, "not a float"))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.parameter(name)?
            .as_bool()
            .ok_or_else(|| KernelError::invalid_parameter(self.label, name, "not a bool"))
    }
}

/// Trait implemented by every processing module.
pub trait ModuleHooks: Send {
    /// Static identity of this module kind.
    fn info(&self) -> ModuleInfo;

    /// Slot descriptors for this module. Read once at construction.
    fn slots(&self) -> &[SlotDescriptor];

    /// Declared parameters with their defaults. Read once at construction.
    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Validate connected inputs and allocate outputs.
    fn init(&mut self, ctx: &ModuleContext) -> Result<()>;

    fn start(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Called once per frame, in level order.
    fn process(&mut self, ctx: &ModuleContext, frame: u64) -> Result<()>;

    fn stop(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Release buffers and return to the as-constructed condition.
    fn reset(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Called after a parameter value was committed.
    fn update_parameters(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Return a message explaining why `candidate` is unacceptable, or `None`.
    fn verify_parameter(&self, _name: &str, _candidate: &ParameterValue) -> Option<String> {
        None
    }

    /// Maximum number of frames this module can produce; 0 = unbounded.
    fn max_frames(&self) -> u64 {
        0
    }

    /// Preferred frame rate, if the module has one.
    fn frame_rate(&self) -> Option<f64> {
        None
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

const FROM_INIT: &[LifecycleState] = &[
    LifecycleState::Uninitialized,
    LifecycleState::Initialized,
    LifecycleState::Stopped,
];
const FROM_START: &[LifecycleState] = &[
    LifecycleState::Initialized,
    LifecycleState::Stopped,
    LifecycleState::Paused,
];
const FROM_PROCESS: &[LifecycleState] = &[LifecycleState::Started, LifecycleState::Paused];
const FROM_PAUSE: &[LifecycleState] = &[LifecycleState::Started];
const FROM_STOP: &[LifecycleState] = &[LifecycleState::Started, LifecycleState::Paused];

/// A live module instance.
pub struct Module {
    id: ModuleId,
    info: ModuleInfo,
    label: Mutex<String>,
    state: Mutex<LifecycleState>,
    inputs: Vec<Arc<Slot>>,
    outputs: Vec<Arc<Slot>>,
    parameters: Mutex<ParameterTable>,
    monitors: Mutex<Vec<Arc<dyn Monitor>>>,
    properties: Mutex<BTreeMap<String, String>>,
    // Lock order: hooks, then state, then parameters.
    hooks: Mutex<Box<dyn ModuleHooks>>,
}

impl Module {
    /// Build a module around `hooks`, creating its slots and parameter table.
    ///
    /// Duplicate slot or parameter names are a defect of the implementation
    /// and fail with `BuggyModule`.
    pub fn new(
        id: ModuleId,
        label: impl Into<String>,
        hooks: Box<dyn ModuleHooks>,
    ) -> Result<Arc<Module>> {
        let info = hooks.info();
        let descriptors: Vec<SlotDescriptor> = hooks.slots().to_vec();
        let params = hooks.parameters();

        let mut seen = HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.name) {
                return Err(KernelError::BuggyModule {
                    module: info.name.to_string(),
                    message: format!("duplicate slot name '{}'", d.name),
                });
            }
        }
        let mut seen = HashSet::new();
        for p in &params {
            if !seen.insert(p.name.clone()) {
                return Err(KernelError::BuggyModule {
                    module: info.name.to_string(),
                    message: format!("duplicate parameter name '{}'", p.name),
                });
            }
        }

        let label = label.into();
        Ok(Arc::new_cyclic(|me| {
            let mut inputs = Vec::new();
            let mut outputs = Vec::new();
            for d in descriptors {
                let kind = d.kind;
                let slot = Arc::new(Slot::new(d, me.clone(), id));
                match kind {
                    SlotKind::Input => inputs.push(slot),
                    SlotKind::Output => outputs.push(slot),
                }
            }
            Module {
                id,
                info,
                label: Mutex::new(label),
                state: Mutex::new(LifecycleState::Uninitialized),
                inputs,
                outputs,
                parameters: Mutex::new(ParameterTable::new(params)),
                monitors: Mutex::new(Vec::new()),
                properties: Mutex::new(BTreeMap::new()),
                hooks: Mutex::new(hooks),
            }
        }))
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// Kind identifier of this module.
    pub fn name(&self) -> &'static str {
        self.info.name
    }

    pub fn label(&self) -> String {
        self.label.lock().clone()
    }

    /// Rename the instance. Uniqueness is checked by the kernel.
    pub fn set_label(&self, label: impl Into<String>) {
        *self.label.lock() = label.into();
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    // ── Slots ──

    pub fn inputs(&self) -> &[Arc<Slot>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<Slot>] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Arc<Slot>> {
        self.inputs.iter().find(|s| s.name() == name)
    }

    pub fn output(&self, name: &str) -> Option<&Arc<Slot>> {
        self.outputs.iter().find(|s| s.name() == name)
    }

    /// Look a slot up by name among inputs and outputs.
    pub fn slot(&self, name: &str) -> Option<&Arc<Slot>> {
        self.input(name).or_else(|| self.output(name))
    }

    pub fn has_connected_input(&self) -> bool {
        self.inputs.iter().any(|s| s.is_connected())
    }

    pub fn has_connected_output(&self) -> bool {
        self.outputs.iter().any(|s| s.is_connected())
    }

    /// Modules fed by this one, with the output slot that feeds them.
    pub fn downstream(&self) -> Vec<(&'static str, Arc<Module>)> {
        let mut result = Vec::new();
        for slot in &self.outputs {
            for peer in slot.peers() {
                if let Some(owner) = peer.owner() {
                    result.push((slot.name(), owner));
                }
            }
        }
        result
    }

    /// Disconnect every slot and detach every monitor before destruction.
    pub fn teardown(&self) {
        for slot in self.inputs.iter().chain(self.outputs.iter()) {
            slot.disconnect_all();
        }
        self.monitors.lock().clear();
    }

    // ── Lifecycle ──

    pub fn init(&self) -> Result<()> {
        self.run_hook("init", FROM_INIT, Some(LifecycleState::Initialized), |h, ctx| {
            h.init(ctx)
        })?;
        self.notify_monitors(ModuleEvent::Initialized);
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.run_hook("start", FROM_START, Some(LifecycleState::Started), |h, ctx| {
            h.start(ctx)
        })
    }

    /// Run the per-frame hook. Legal only while Started or Paused.
    pub fn process(&self, frame: u64) -> Result<()> {
        self.run_hook("process", FROM_PROCESS, None, |h, ctx| h.process(ctx, frame))?;
        self.notify_monitors(ModuleEvent::Processed { frame });
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.run_hook("pause", FROM_PAUSE, Some(LifecycleState::Paused), |h, ctx| {
            h.pause(ctx)
        })
    }

    pub fn stop(&self) -> Result<()> {
        self.run_hook("stop", FROM_STOP, Some(LifecycleState::Stopped), |h, ctx| {
            h.stop(ctx)
        })
    }

    /// Return to the as-constructed condition. Legal from any state.
    pub fn reset(&self) -> Result<()> {
        self.run_hook("reset", &[], Some(LifecycleState::Uninitialized), |h, ctx| {
            h.reset(ctx)
        })?;
        for slot in &self.outputs {
            slot.clear_image();
        }
        self.notify_monitors(ModuleEvent::Reset);
        Ok(())
    }

    pub fn max_frames(&self) -> u64 {
        self.hooks.lock().max_frames()
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.hooks.lock().frame_rate()
    }

    /// Guard, call the hook, then commit `next` only if the hook succeeded.
    /// An empty `allowed` list means any state.
    fn run_hook<F>(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
        next: Option<LifecycleState>,
        hook: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut dyn ModuleHooks, &ModuleContext) -> Result<()>,
    {
        let mut hooks = self.hooks.lock();
        let label = self.label();
        let current = self.state();
        if !allowed.is_empty() && !allowed.contains(&current) {
            return Err(KernelError::InvalidOperationModuleState {
                module: label,
                operation,
                state: current.to_string(),
            });
        }

        let params = self.parameters.lock();
        let ctx = ModuleContext {
            label: &label,
            inputs: &self.inputs,
            outputs: &self.outputs,
            parameters: &params,
        };
        match catch_unwind(AssertUnwindSafe(|| hook(&mut **hooks, &ctx))) {
            Ok(result) => result?,
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!("Module '{}' panicked in {}: {}", label, operation, message);
                return Err(KernelError::Undefined(format!(
                    "module '{}' panicked in {}: {}",
                    label, operation, message
                )));
            }
        }
        drop(params);

        if let Some(next) = next {
            *self.state.lock() = next;
            tracing::trace!("Module '{}' {} -> {}", label, current, next);
        }
        Ok(())
    }

    // ── Parameters ──

    /// Validate and commit a parameter value, then call `update_parameters`.
    ///
    /// Must not be called while holding [`Module::lock_parameters`].
    pub fn set_parameter_value(&self, name: &str, value: ParameterValue) -> Result<()> {
        let mut hooks = self.hooks.lock();
        let label = self.label();
        let running = self.state().is_running();

        let mut params = self.parameters.lock();
        let value = params.validate(&label, name, value, running)?;
        if let Some(message) = hooks.verify_parameter(name, &value) {
            if !message.is_empty() {
                return Err(KernelError::invalid_parameter(&label, name, message));
            }
        }
        let previous = params.commit(name, value);

        let ctx = ModuleContext {
            label: &label,
            inputs: &self.inputs,
            outputs: &self.outputs,
            parameters: &params,
        };
        if let Err(e) = hooks.update_parameters(&ctx) {
            if let Some(previous) = previous {
                params.commit(name, previous);
            }
            return Err(e);
        }
        tracing::debug!("Module '{}' parameter '{}' updated", label, name);
        Ok(())
    }

    pub fn parameter_value(&self, name: &str) -> Option<ParameterValue> {
        self.parameters.lock().value(name).cloned()
    }

    /// Snapshot of the parameter table.
    pub fn parameters(&self) -> ParameterTable {
        self.parameters.lock().clone()
    }

    /// Hold the parameter table for a multi-step read-modify-write sequence.
    pub fn lock_parameters(&self) -> MutexGuard<'_, ParameterTable> {
        self.parameters.lock()
    }

    // ── Monitors ──

    pub fn attach_monitor(&self, monitor: Arc<dyn Monitor>) {
        self.monitors.lock().push(monitor);
    }

    /// Returns whether the monitor was attached.
    pub fn detach_monitor(&self, monitor: &Arc<dyn Monitor>) -> bool {
        let mut monitors = self.monitors.lock();
        let before = monitors.len();
        monitors.retain(|m| !std::ptr::addr_eq(Arc::as_ptr(m), Arc::as_ptr(monitor)));
        monitors.len() != before
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.lock().len()
    }

    fn notify_monitors(&self, event: ModuleEvent) {
        let monitors = self.monitors.lock().clone();
        if monitors.is_empty() {
            return;
        }
        let label = self.label();
        for monitor in monitors {
            monitor.on_module_event(&label, event);
        }
    }

    // ── Properties ──

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.lock().insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.lock().get(key).cloned()
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        self.properties.lock().clone()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.info.name)
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}
