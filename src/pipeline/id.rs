//! Identity types for the pipeline system.
//!
//! Module ids are handed out by the [`ModuleFactory`](crate::pipeline::ModuleFactory)
//! that created the module and never reused for the lifetime of that factory.
//! They key the graph algorithms' per-module tables.

use std::fmt;

/// Stable identifier of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of a slot in project files and on the CLI: `label.slot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    pub module: String,
    pub slot: String,
}

impl SlotAddress {
    pub fn new(module: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            slot: slot.into(),
        }
    }

    /// Parse `label.slot`. The label may itself contain dots; the last one splits.
    pub fn parse(s: &str) -> Option<Self> {
        let (module, slot) = s.rsplit_once('.')?;
        if module.is_empty() || slot.is_empty() {
            return None;
        }
        Some(Self::new(module, slot))
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.slot)
    }
}
