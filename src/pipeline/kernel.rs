//! The kernel control surface.
//!
//! A kernel owns the module set, sequences lifecycle calls across the whole
//! graph and publishes a [`KernelState`] after every transition. Lifecycle
//! operations return once the command has been accepted; its outcome is
//! delivered through the state notifier.

use crate::error::Result;
use crate::pipeline::graph::ModuleLevels;
use crate::pipeline::module::Module;
use crate::pipeline::notifier::Notifier;
use crate::pipeline::state::KernelState;
use std::sync::Arc;

pub trait Kernel: Send + Sync {
    // ── Lifecycle (asynchronous, acknowledged on acceptance) ──

    fn init(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Re-process the current frame without advancing.
    fn refresh(&self) -> Result<()>;
    /// Advance exactly one frame and remain paused.
    fn step(&self) -> Result<()>;
    fn reset(&self) -> Result<()>;
    /// Remove every module.
    fn clear(&self) -> Result<()>;

    // ── Module set (synchronous) ──

    /// Create a module of `kind` with a fresh unique label.
    fn new_module(&self, kind: &str) -> Result<Arc<Module>>;
    fn delete_module(&self, module: &Arc<Module>) -> Result<()>;
    fn get_module(&self, label: &str) -> Option<Arc<Module>>;
    fn get_modules(&self) -> Vec<Arc<Module>>;
    fn rename_module(&self, module: &Arc<Module>, label: &str) -> Result<()>;
    /// Connect `from` (an output, `label.slot`) to `to` (an input).
    fn connect(&self, from: &str, to: &str) -> Result<()>;
    fn disconnect(&self, from: &str, to: &str) -> Result<()>;

    // ── Graph ──

    fn compute_module_level(&self) -> Result<ModuleLevels>;
    fn detect_module_graph_cycle(&self) -> Result<()>;

    // ── State ──

    /// Install the notifier that receives every published state.
    fn set_kernel_state_notifier(&self, notifier: Arc<Notifier<KernelState>>);
    /// Latest published state.
    fn state(&self) -> KernelState;
}
