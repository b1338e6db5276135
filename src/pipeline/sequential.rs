//! Sequential kernel: one worker thread drives the whole graph.
//!
//! The worker is the only thread that calls module lifecycle methods. Callers
//! talk to it through a bounded crossbeam command channel; each command
//! carries a one-shot reply channel on which the worker acknowledges or
//! rejects it as soon as it is dequeued. The outcome is then published as a
//! [`KernelState`] through the state notifier.
//!
//! # Frame loop
//!
//! While Started, the worker processes one frame per iteration (every module
//! in level order) and checks for a new command between frames, so stop and
//! pause take effect at the next frame boundary.
//!
//! `frame` counts processed frames: frame `n` is processed while the counter
//! reads `n`, then the counter becomes `n + 1` and is published. A run bounded
//! to `N` frames therefore processes `0..N` and ends Stopped at `N`.

use crate::config::KernelConfig;
use crate::error::{KernelError, Result, ResultExt};
use crate::pipeline::factory::ModuleFactory;
use crate::pipeline::graph::{self, ModuleLevels};
use crate::pipeline::id::SlotAddress;
use crate::pipeline::kernel::Kernel;
use crate::pipeline::module::Module;
use crate::pipeline::notifier::Notifier;
use crate::pipeline::slot::Slot;
use crate::pipeline::state::{KernelState, LifecycleState};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Commands executed by the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelCommand {
    Init,
    Start,
    Pause,
    Stop,
    Refresh,
    Step,
    Reset,
    Clear,
    Exit,
}

impl KernelCommand {
    fn name(self) -> &'static str {
        match self {
            KernelCommand::Init => "init",
            KernelCommand::Start => "start",
            KernelCommand::Pause => "pause",
            KernelCommand::Stop => "stop",
            KernelCommand::Refresh => "refresh",
            KernelCommand::Step => "step",
            KernelCommand::Reset => "reset",
            KernelCommand::Clear => "clear",
            KernelCommand::Exit => "exit",
        }
    }

    /// States from which the command is accepted. Empty = any state.
    fn accepted_from(self) -> &'static [LifecycleState] {
        use LifecycleState::*;
        match self {
            KernelCommand::Init => &[Uninitialized, Initialized, Stopped],
            KernelCommand::Start => &[Initialized, Stopped, Paused],
            KernelCommand::Pause => &[Started],
            KernelCommand::Stop => &[Started, Paused],
            KernelCommand::Refresh => &[Started, Paused],
            KernelCommand::Step => &[Initialized, Stopped, Paused],
            KernelCommand::Clear => &[Uninitialized, Initialized, Stopped],
            KernelCommand::Reset | KernelCommand::Exit => &[],
        }
    }
}

struct Envelope {
    command: KernelCommand,
    ack: Sender<Result<()>>,
}

/// State shared between the caller-facing handle and the worker.
struct KernelShared {
    modules: Mutex<Vec<Arc<Module>>>,
    state: Mutex<KernelState>,
    notifier: Mutex<Arc<Notifier<KernelState>>>,
    /// Set while the worker executes an accepted command.
    engaged: AtomicBool,
}

impl KernelShared {
    /// Reject module-set mutation while a command runs or the pipeline is live.
    /// Must be called with the modules lock held.
    fn ensure_editable(&self, operation: &'static str) -> Result<()> {
        if self.engaged.load(Ordering::Acquire) {
            return Err(KernelError::InvalidOperationKernelState {
                operation,
                state: "executing a command".to_string(),
            });
        }
        let state = self.state.lock().state;
        if state.is_running() {
            return Err(KernelError::InvalidOperationKernelState {
                operation,
                state: state.to_string(),
            });
        }
        Ok(())
    }
}

/// Kernel running every module on a single dedicated thread.
pub struct SequentialKernel {
    shared: Arc<KernelShared>,
    cmd_tx: Sender<Envelope>,
    worker: Mutex<Option<JoinHandle<()>>>,
    factory: ModuleFactory,
}

impl SequentialKernel {
    /// Spawn a kernel with the built-in module kinds.
    pub fn new(config: KernelConfig) -> Result<Self> {
        Self::with_factory(config, ModuleFactory::with_builtin())
    }

    pub fn with_factory(config: KernelConfig, factory: ModuleFactory) -> Result<Self> {
        let shared = Arc::new(KernelShared {
            modules: Mutex::new(Vec::new()),
            state: Mutex::new(KernelState::default()),
            notifier: Mutex::new(Arc::new(Notifier::new())),
            engaged: AtomicBool::new(false),
        });
        let (cmd_tx, cmd_rx) = bounded(config.command_capacity.max(1));

        let worker = Worker::new(shared.clone(), cmd_rx, config.max_frames);
        let handle = std::thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| KernelError::Undefined(format!("failed to spawn kernel worker: {}", e)))?;

        Ok(Self {
            shared,
            cmd_tx,
            worker: Mutex::new(Some(handle)),
            factory,
        })
    }

    pub fn factory(&self) -> &ModuleFactory {
        &self.factory
    }

    /// Notifier currently receiving published states.
    pub fn notifier(&self) -> Arc<Notifier<KernelState>> {
        self.shared.notifier.lock().clone()
    }

    /// Insert an externally constructed module. Labels and ids must be unique.
    pub fn add_module(&self, module: Arc<Module>) -> Result<()> {
        let mut modules = self.shared.modules.lock();
        self.shared.ensure_editable("add a module")?;
        let label = module.label();
        if modules.iter().any(|m| m.id() == module.id() || m.label() == label) {
            return Err(KernelError::UseModule {
                module: label,
                message: "a module with this id or label already exists".to_string(),
            });
        }
        tracing::info!("Added module '{}' ({})", label, module.name());
        modules.push(module);
        Ok(())
    }

    /// Stop the worker thread and wait for it to finish. Idempotent.
    pub fn exit(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if let Err(e) = self.send(KernelCommand::Exit) {
            tracing::warn!("Kernel exit request not delivered: {}", e);
        }
        if handle.join().is_err() {
            tracing::error!("Kernel worker thread panicked");
        }
    }

    /// Post a command and wait for the worker to accept or reject it.
    fn send(&self, command: KernelCommand) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        let gone = || KernelError::Undefined("kernel worker is not running".to_string());
        self.cmd_tx
            .send(Envelope {
                command,
                ack: ack_tx,
            })
            .map_err(|_| gone())?;
        ack_rx.recv().map_err(|_| gone())?
    }

    fn find_slot(modules: &[Arc<Module>], address: &str) -> Result<Arc<Slot>> {
        let addr = SlotAddress::parse(address).ok_or_else(|| {
            KernelError::InvalidSlot(format!("'{}' is not a label.slot address", address))
        })?;
        let module = modules
            .iter()
            .find(|m| m.label() == addr.module)
            .ok_or_else(|| KernelError::InvalidSlot(format!("{} (no such module)", addr)))?;
        module
            .slot(&addr.slot)
            .cloned()
            .ok_or_else(|| KernelError::InvalidSlot(format!("{} (no such slot)", addr)))
    }

    fn modules(&self) -> MutexGuard<'_, Vec<Arc<Module>>> {
        self.shared.modules.lock()
    }
}

impl Kernel for SequentialKernel {
    fn init(&self) -> Result<()> {
        self.send(KernelCommand::Init)
    }

    fn start(&self) -> Result<()> {
        self.send(KernelCommand::Start)
    }

    fn pause(&self) -> Result<()> {
        self.send(KernelCommand::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.send(KernelCommand::Stop)
    }

    fn refresh(&self) -> Result<()> {
        self.send(KernelCommand::Refresh)
    }

    fn step(&self) -> Result<()> {
        self.send(KernelCommand::Step)
    }

    fn reset(&self) -> Result<()> {
        self.send(KernelCommand::Reset)
    }

    fn clear(&self) -> Result<()> {
        self.send(KernelCommand::Clear)
    }

    fn new_module(&self, kind: &str) -> Result<Arc<Module>> {
        let mut modules = self.modules();
        self.shared.ensure_editable("create a module")?;
        if !self.factory.contains(kind) {
            return Err(KernelError::CreateModule(format!("unknown module kind '{}'", kind)));
        }
        let label = loop {
            let candidate = self.factory.next_label(kind);
            if !modules.iter().any(|m| m.label() == candidate) {
                break candidate;
            }
        };
        let module = self.factory.create(kind, label)?;
        tracing::info!("Created module '{}' ({})", module.label(), kind);
        modules.push(module.clone());
        Ok(module)
    }

    fn delete_module(&self, module: &Arc<Module>) -> Result<()> {
        let mut modules = self.modules();
        self.shared.ensure_editable("delete a module")?;
        let index = modules
            .iter()
            .position(|m| Arc::ptr_eq(m, module))
            .ok_or_else(|| {
                KernelError::DeleteModule(format!("'{}' does not belong to this kernel", module.label()))
            })?;
        let removed = modules.remove(index);
        removed.teardown();
        tracing::info!("Deleted module '{}'", removed.label());
        Ok(())
    }

    fn get_module(&self, label: &str) -> Option<Arc<Module>> {
        self.modules().iter().find(|m| m.label() == label).cloned()
    }

    fn get_modules(&self) -> Vec<Arc<Module>> {
        self.modules().clone()
    }

    fn rename_module(&self, module: &Arc<Module>, label: &str) -> Result<()> {
        let modules = self.modules();
        if !modules.iter().any(|m| Arc::ptr_eq(m, module)) {
            return Err(KernelError::UseModule {
                module: module.label(),
                message: "module does not belong to this kernel".to_string(),
            });
        }
        if label.is_empty() || label.contains('.') {
            return Err(KernelError::UseModule {
                module: module.label(),
                message: format!("'{}' is not a valid label", label),
            });
        }
        if modules.iter().any(|m| !Arc::ptr_eq(m, module) && m.label() == label) {
            return Err(KernelError::UseModule {
                module: module.label(),
                message: format!("label '{}' is already taken", label),
            });
        }
        tracing::debug!("Renamed module '{}' to '{}'", module.label(), label);
        module.set_label(label);
        Ok(())
    }

    fn connect(&self, from: &str, to: &str) -> Result<()> {
        let modules = self.modules();
        self.shared.ensure_editable("connect slots")?;
        let output = Self::find_slot(&modules, from)?;
        let input = Self::find_slot(&modules, to)?;
        Slot::connect(&output, &input)
    }

    fn disconnect(&self, from: &str, to: &str) -> Result<()> {
        let modules = self.modules();
        self.shared.ensure_editable("disconnect slots")?;
        let output = Self::find_slot(&modules, from)?;
        let input = Self::find_slot(&modules, to)?;
        Slot::disconnect(&output, &input)
    }

    fn compute_module_level(&self) -> Result<ModuleLevels> {
        let modules = self.get_modules();
        graph::compute_level(&modules)
    }

    fn detect_module_graph_cycle(&self) -> Result<()> {
        let modules = self.get_modules();
        graph::detect_cycle(&modules)
    }

    fn set_kernel_state_notifier(&self, notifier: Arc<Notifier<KernelState>>) {
        *self.shared.notifier.lock() = notifier;
    }

    fn state(&self) -> KernelState {
        self.shared.state.lock().clone()
    }
}

impl Drop for SequentialKernel {
    fn drop(&mut self) {
        self.exit();
    }
}

impl std::fmt::Debug for SequentialKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialKernel")
            .field("state", &self.state())
            .field("modules", &self.modules().len())
            .finish()
    }
}

// ── Worker ──

struct Worker {
    shared: Arc<KernelShared>,
    cmd_rx: Receiver<Envelope>,
    /// Modules in level order for the current run.
    schedule: Vec<Arc<Module>>,
    state: LifecycleState,
    frame: u64,
    max_frames: u64,
    frame_limit: u64,
}

impl Worker {
    fn new(shared: Arc<KernelShared>, cmd_rx: Receiver<Envelope>, frame_limit: u64) -> Self {
        Self {
            shared,
            cmd_rx,
            schedule: Vec::new(),
            state: LifecycleState::Uninitialized,
            frame: 0,
            max_frames: 0,
            frame_limit,
        }
    }

    fn run(mut self) {
        tracing::info!("Kernel worker started");

        loop {
            let envelope = if self.state == LifecycleState::Started {
                match self.cmd_rx.try_recv() {
                    Ok(envelope) => envelope,
                    Err(TryRecvError::Empty) => {
                        self.run_frame();
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.cmd_rx.recv() {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                }
            };

            let command = envelope.command;
            if let Err(e) = self.accept(command) {
                tracing::debug!("Rejected kernel command {:?}: {}", command, e);
                let _ = envelope.ack.send(Err(e));
                continue;
            }
            let _ = envelope.ack.send(Ok(()));
            tracing::debug!("Kernel command {:?} accepted in state {}", command, self.state);

            match command {
                KernelCommand::Init => self.init(),
                KernelCommand::Start => self.start(),
                KernelCommand::Pause => self.pause(),
                KernelCommand::Stop => self.stop(),
                KernelCommand::Refresh => self.refresh(),
                KernelCommand::Step => self.step(),
                KernelCommand::Reset => self.reset(),
                KernelCommand::Clear => self.clear(),
                KernelCommand::Exit => break,
            }
        }

        self.shutdown();
        tracing::info!("Kernel worker exiting");
    }

    /// Validate `command` against the current state and engage the kernel.
    fn accept(&self, command: KernelCommand) -> Result<()> {
        // Engaging under the modules lock orders it against caller-side edits.
        let _modules = self.shared.modules.lock();
        let allowed = command.accepted_from();
        if !allowed.is_empty() && !allowed.contains(&self.state) {
            return Err(KernelError::InvalidOperationKernelState {
                operation: command.name(),
                state: self.state.to_string(),
            });
        }
        if command != KernelCommand::Exit {
            self.shared.engaged.store(true, Ordering::Release);
        }
        Ok(())
    }

    // ── Commands ──

    fn init(&mut self) {
        let modules = self.shared.modules.lock().clone();
        let levels = match graph::compute_level(&modules) {
            Ok(levels) => levels,
            Err(e) => return self.publish(LifecycleState::Uninitialized, Some(e)),
        };
        let order = levels.ordered();

        for (index, module) in order.iter().enumerate() {
            if let Err(e) = module.init() {
                let e = e.with_context(format!("initializing '{}'", module.label()));
                for done in order[..index].iter().rev() {
                    if let Err(cleanup) = done.reset() {
                        tracing::warn!("Rollback reset of '{}' failed: {}", done.label(), cleanup);
                    }
                }
                self.schedule.clear();
                self.frame = 0;
                return self.publish(LifecycleState::Uninitialized, Some(e));
            }
        }

        self.schedule = order;
        self.frame = 0;
        self.max_frames = self.frame_bound();
        self.publish(LifecycleState::Initialized, None);
    }

    fn start(&mut self) {
        if self.state != LifecycleState::Paused {
            if let Err(e) = self.prepare_run() {
                return self.publish(LifecycleState::Stopped, Some(e));
            }
        }

        match self.start_all() {
            Ok(()) => self.publish(LifecycleState::Started, None),
            Err(e) => self.publish(LifecycleState::Stopped, Some(e)),
        }
    }

    /// Start modules in level order, stopping the already started ones in
    /// reverse order if one fails.
    fn start_all(&self) -> Result<()> {
        for (index, module) in self.schedule.iter().enumerate() {
            if let Err(e) = module.start() {
                stop_best_effort(self.schedule[..index].iter().rev());
                return Err(e.with_context(format!("starting '{}'", module.label())));
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut first_error = None;
        for module in &self.schedule {
            if let Err(e) = module.pause() {
                tracing::warn!("Pausing '{}' failed: {}", module.label(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            // Pause failures are reported but the pipeline keeps its state.
            Some(e) => self.publish(self.state, Some(e)),
            None => self.publish(LifecycleState::Paused, None),
        }
    }

    fn stop(&mut self) {
        let error = stop_best_effort(self.schedule.iter());
        self.publish(LifecycleState::Stopped, error);
    }

    fn refresh(&mut self) {
        let frame = self.frame.saturating_sub(1);
        if let Err(e) = self.process_all(frame) {
            return self.abort_run(e);
        }
        self.publish(self.state, None);
    }

    fn step(&mut self) {
        if self.state != LifecycleState::Paused {
            if let Err(e) = self.prepare_run() {
                return self.publish(LifecycleState::Stopped, Some(e));
            }
        }

        if let Err(e) = self.step_all(self.frame) {
            return self.abort_run(e);
        }

        self.frame += 1;
        self.publish(LifecycleState::Paused, None);
        if self.bound_reached() {
            self.finish_run();
        }
    }

    /// One-shot start, process and pause per module, in level order.
    fn step_all(&self, frame: u64) -> Result<()> {
        for module in &self.schedule {
            module
                .start()
                .and_then(|_| module.process(frame))
                .and_then(|_| module.pause())
                .with_context(|| format!("stepping '{}' to frame {}", module.label(), frame))?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        let modules = self.shared.modules.lock().clone();
        let order = graph::compute_level(&modules)
            .map(|levels| levels.ordered())
            .unwrap_or(modules);

        let mut first_error = None;
        for module in &order {
            if let Err(e) = module.reset() {
                tracing::warn!("Resetting '{}' failed: {}", module.label(), e);
                first_error.get_or_insert(e);
            }
        }
        self.schedule.clear();
        self.frame = 0;
        self.max_frames = 0;
        self.publish(LifecycleState::Uninitialized, first_error);
    }

    fn clear(&mut self) {
        let removed = std::mem::take(&mut *self.shared.modules.lock());
        for module in &removed {
            if let Err(e) = module.reset() {
                tracing::warn!("Resetting '{}' before removal failed: {}", module.label(), e);
            }
            module.teardown();
        }
        tracing::info!("Cleared {} modules", removed.len());
        self.schedule.clear();
        self.frame = 0;
        self.max_frames = 0;
        self.publish(LifecycleState::Uninitialized, None);
    }

    // ── Frame loop ──

    fn run_frame(&mut self) {
        let frame = self.frame;
        if let Err(e) = self.process_all(frame) {
            return self.abort_run(e);
        }
        self.frame += 1;
        if self.bound_reached() {
            self.finish_run();
        } else {
            self.publish(LifecycleState::Started, None);
        }
    }

    fn process_all(&self, frame: u64) -> Result<()> {
        for module in &self.schedule {
            module
                .process(frame)
                .with_context(|| format!("processing '{}' at frame {}", module.label(), frame))?;
        }
        Ok(())
    }

    /// A module failed mid-run: unwind everything still live, report the failure.
    fn abort_run(&mut self, error: KernelError) {
        tracing::error!("Kernel run aborted: {}", error);
        stop_best_effort(self.schedule.iter().rev());
        self.publish(LifecycleState::Stopped, Some(error));
    }

    fn finish_run(&mut self) {
        tracing::info!("Frame bound {} reached", self.max_frames);
        let error = stop_best_effort(self.schedule.iter());
        self.publish(LifecycleState::Stopped, error);
    }

    /// Recompute the schedule and the frame bound for a fresh run.
    fn prepare_run(&mut self) -> Result<()> {
        let modules = self.shared.modules.lock().clone();
        self.schedule = graph::compute_level(&modules)?.ordered();
        self.frame = 0;
        self.max_frames = self.frame_bound();
        Ok(())
    }

    /// Smallest non-zero bound among modules and the configured limit.
    fn frame_bound(&self) -> u64 {
        self.schedule
            .iter()
            .map(|m| m.max_frames())
            .chain(std::iter::once(self.frame_limit))
            .filter(|&n| n > 0)
            .min()
            .unwrap_or(0)
    }

    fn bound_reached(&self) -> bool {
        self.max_frames > 0 && self.frame >= self.max_frames
    }

    fn shutdown(&mut self) {
        if self.state.is_running() {
            stop_best_effort(self.schedule.iter().rev());
        }
        self.schedule.clear();
    }

    // ── Publishing ──

    fn publish(&mut self, state: LifecycleState, error: Option<KernelError>) {
        let transition = state != self.state;
        self.state = state;

        let mut snapshot = KernelState::new(state, self.frame, self.max_frames);
        if let Some(e) = error {
            snapshot = snapshot.with_error(e);
        }
        *self.shared.state.lock() = snapshot.clone();
        self.shared.engaged.store(false, Ordering::Release);

        if snapshot.is_exception_raised() {
            tracing::warn!("Kernel state: {}", snapshot);
        } else if transition {
            tracing::debug!("Kernel state: {}", snapshot);
        } else {
            tracing::trace!("Kernel state: {}", snapshot);
        }

        let notifier = self.shared.notifier.lock().clone();
        notifier.notify(snapshot);
    }
}

/// Stop every Started or Paused module, logging failures.
/// Returns the first failure.
fn stop_best_effort<'a>(modules: impl Iterator<Item = &'a Arc<Module>>) -> Option<KernelError> {
    let mut first_error = None;
    for module in modules {
        if !module.state().is_running() {
            continue;
        }
        if let Err(e) = module.stop() {
            tracing::warn!("Stopping '{}' failed: {}", module.label(), e);
            first_error.get_or_insert(e);
        }
    }
    first_error
}
