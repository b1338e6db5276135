//! Module factory: maps kind names to constructors.
//!
//! The factory owns the instance id counter and the per-kind label counters,
//! so two kernels never share numbering state.

use crate::error::{KernelError, Result};
use crate::pipeline::id::ModuleId;
use crate::pipeline::module::{Module, ModuleHooks};
use crate::pipeline::modules::{Invert, NullSink, PatternSource};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Constructor = Box<dyn Fn() -> Box<dyn ModuleHooks> + Send + Sync>;

pub struct ModuleFactory {
    constructors: RwLock<BTreeMap<String, Constructor>>,
    next_id: AtomicU32,
    label_counters: Mutex<HashMap<String, u32>>,
}

impl ModuleFactory {
    /// An empty factory with no registered kinds.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            label_counters: Mutex::new(HashMap::new()),
        }
    }

    /// A factory with the built-in modules registered.
    pub fn with_builtin() -> Self {
        let factory = Self::new();
        let builtin: [(&str, Constructor); 3] = [
            ("PatternSource", Box::new(|| Box::new(PatternSource::new()))),
            ("Invert", Box::new(|| Box::new(Invert::new()))),
            ("NullSink", Box::new(|| Box::new(NullSink::new()))),
        ];
        for (kind, ctor) in builtin {
            factory.constructors.write().insert(kind.to_string(), ctor);
        }
        factory
    }

    /// Register a module kind. Fails with `AlreadyLoadedModule` if the kind
    /// is taken.
    pub fn register<F>(&self, kind: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn ModuleHooks> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let mut constructors = self.constructors.write();
        if constructors.contains_key(&kind) {
            return Err(KernelError::AlreadyLoadedModule(kind));
        }
        tracing::debug!("Registered module kind '{}'", kind);
        constructors.insert(kind, Box::new(constructor));
        Ok(())
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.read().contains_key(kind)
    }

    /// Next candidate label for `kind`: the kind name followed by a counter.
    pub fn next_label(&self, kind: &str) -> String {
        let mut counters = self.label_counters.lock();
        let counter = counters.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        format!("{}{}", kind, counter)
    }

    /// Instantiate a module of `kind` with the given label.
    pub fn create(&self, kind: &str, label: impl Into<String>) -> Result<Arc<Module>> {
        let hooks = {
            let constructors = self.constructors.read();
            let ctor = constructors
                .get(kind)
                .ok_or_else(|| KernelError::CreateModule(format!("unknown module kind '{}'", kind)))?;
            ctor()
        };
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Module::new(id, label, hooks)
    }
}

impl Default for ModuleFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}
