//! Frame-synchronous dataflow engine.
//!
//! Modules expose typed image slots and are wired into a directed graph. A
//! kernel drives the graph through the lifecycle and processes every module
//! once per frame, producers before consumers.
//!
//! # Architecture
//!
//! ```text
//!            commands (crossbeam)          KernelState (Notifier)
//! caller ───────────────────────► worker ─────────────────────────► observers
//!                                   │
//!                                   ▼ level order, once per frame
//!                    [PatternSource] ──► [Invert] ──► [NullSink]
//!                              slot image channels (Arc<Mutex>)
//! ```
//!
//! # Design
//!
//! - **Trait at the module seam**: `ModuleHooks` is what an implementation
//!   provides; `Module` wraps it with slots, parameters and the state machine.
//! - **Shared image channel**: an output slot owns `Arc<Mutex<Option<Image>>>`;
//!   connected inputs clone the `Arc`, one lock per produced image.
//! - **Dedicated worker thread**: only the kernel worker calls lifecycle hooks.
//! - **Errors as data**: worker-side failures ride on the published
//!   `KernelState` instead of crossing the thread boundary.

pub mod factory;
pub mod graph;
pub mod id;
pub mod kernel;
pub mod module;
pub mod modules;
pub mod monitor;
pub mod notifier;
pub mod parameter;
pub mod sequential;
pub mod slot;
pub mod state;

pub use factory::ModuleFactory;
pub use graph::{compute_level, detect_cycle, ModuleLevels};
pub use id::{ModuleId, SlotAddress};
pub use kernel::Kernel;
pub use module::{Module, ModuleContext, ModuleHooks, ModuleInfo};
pub use monitor::{FrameGrabber, ModuleEvent, Monitor};
pub use notifier::{Notifier, NotifierGuard};
pub use parameter::{Parameter, ParameterTable, ParameterValue};
pub use sequential::{KernelCommand, SequentialKernel};
pub use slot::{ImageChannel, ImageGuard, Slot, SlotDescriptor, SlotKind};
pub use state::{KernelState, LifecycleState};
