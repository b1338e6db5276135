//! Graph algorithms over the live module set.
//!
//! The graph is never stored: edges are read from the slot connections each
//! time. Both algorithms are pure functions of the current wiring.
//!
//! - [`detect_cycle`] walks output → input connections depth-first with an
//!   explicit stack and fails with the offending path.
//! - [`compute_level`] assigns every module a level such that producers sit
//!   strictly below their direct consumers. Modules on the same level are
//!   independent of each other.

use crate::error::{KernelError, Result};
use crate::pipeline::id::ModuleId;
use crate::pipeline::module::Module;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One frame of the explicit DFS stack: a module and its outgoing edges.
struct WalkFrame {
    module: Arc<Module>,
    edges: Vec<(&'static str, Arc<Module>)>,
    next: usize,
}

impl WalkFrame {
    fn new(module: Arc<Module>) -> Self {
        let edges = module.downstream();
        Self {
            module,
            edges,
            next: 0,
        }
    }

    /// Slot through which the walk left this module.
    fn current_slot(&self) -> &'static str {
        self.edges[self.next.saturating_sub(1)].0
    }
}

/// Fail with `ModuleCycleDetected` if following output → input connections
/// from any module leads back to it.
pub fn detect_cycle(modules: &[Arc<Module>]) -> Result<()> {
    let members: HashSet<ModuleId> = modules.iter().map(|m| m.id()).collect();

    for origin in modules {
        let mut visited: HashSet<ModuleId> = HashSet::new();
        visited.insert(origin.id());
        let mut stack = vec![WalkFrame::new(origin.clone())];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.edges.len() {
                stack.pop();
                continue;
            }
            let target = frame.edges[frame.next].1.clone();
            frame.next += 1;

            if !members.contains(&target.id()) {
                continue;
            }
            if target.id() == origin.id() {
                return Err(KernelError::ModuleCycleDetected(describe_path(&stack, origin)));
            }
            // A node fully explored in this search cannot lead back to the origin.
            if visited.insert(target.id()) {
                stack.push(WalkFrame::new(target));
            }
        }
    }
    Ok(())
}

fn describe_path(stack: &[WalkFrame], origin: &Arc<Module>) -> String {
    let mut path = String::new();
    for frame in stack {
        path.push_str(&format!("{}({})->", frame.module.label(), frame.current_slot()));
    }
    path.push_str(&origin.label());
    path
}

/// Level assignment of a module set, grouped by level.
#[derive(Debug, Clone, Default)]
pub struct ModuleLevels {
    by_level: BTreeMap<u32, Vec<Arc<Module>>>,
    by_id: HashMap<ModuleId, u32>,
}

impl ModuleLevels {
    pub fn level_of(&self, id: ModuleId) -> Option<u32> {
        self.by_id.get(&id).copied()
    }

    /// Modules on `level`, in a stable order.
    pub fn at(&self, level: u32) -> &[Arc<Module>] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest level present, if any module exists.
    pub fn max_level(&self) -> Option<u32> {
        self.by_level.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate `(level, module)` in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Arc<Module>)> {
        self.by_level
            .iter()
            .flat_map(|(level, modules)| modules.iter().map(move |m| (*level, m)))
    }

    /// All modules flattened into execution order.
    pub fn ordered(&self) -> Vec<Arc<Module>> {
        self.iter().map(|(_, m)| m.clone()).collect()
    }
}

/// Assign levels: 0 for modules without a connected input, otherwise one
/// more than the highest level among direct producers.
///
/// Levels are only ever raised, so a module reached again through a longer
/// branch ends up above every producer regardless of visiting order.
pub fn compute_level(modules: &[Arc<Module>]) -> Result<ModuleLevels> {
    detect_cycle(modules)?;

    let members: HashSet<ModuleId> = modules.iter().map(|m| m.id()).collect();
    let mut level: HashMap<ModuleId, u32> = modules.iter().map(|m| (m.id(), 0)).collect();

    let mut frontier: Vec<Arc<Module>> = modules
        .iter()
        .filter(|m| !m.has_connected_input())
        .cloned()
        .collect();
    let mut frontier_level = 0u32;

    while !frontier.is_empty() {
        let mut next: Vec<Arc<Module>> = Vec::new();
        let mut queued: HashSet<ModuleId> = HashSet::new();

        for module in &frontier {
            for (_, downstream) in module.downstream() {
                let id = downstream.id();
                if !members.contains(&id) {
                    continue;
                }
                let entry = level.entry(id).or_insert(0);
                *entry = (*entry).max(frontier_level + 1);
                if downstream.has_connected_output() && queued.insert(id) {
                    next.push(downstream);
                }
            }
        }

        frontier = next;
        frontier_level += 1;
    }

    let mut result = ModuleLevels::default();
    for module in modules {
        let l = level.get(&module.id()).copied().unwrap_or(0);
        result.by_level.entry(l).or_default().push(module.clone());
        result.by_id.insert(module.id(), l);
    }

    tracing::debug!(
        "Computed levels for {} modules (max level {:?})",
        result.len(),
        result.max_level()
    );
    Ok(result)
}
