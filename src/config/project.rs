//! Project files (`.ffproj`).
//!
//! A project lists module instances and the connections between their slots.
//! [`ProjectFile::apply`] rebuilds the pipeline on a kernel in three passes:
//! modules, then parameter values, then connections.

use crate::error::{KernelError, Result, ResultExt};
use crate::pipeline::{Kernel, ParameterValue, SlotAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current project file format version
pub const PROJECT_VERSION: u32 = 1;

/// One module instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Factory kind, e.g. `PatternSource`
    pub kind: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// An output → input connection, both written as `label.slot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

fn default_version() -> u32 {
    PROJECT_VERSION
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            name: String::new(),
            modules: Vec::new(),
            connections: Vec::new(),
        }
    }
}

impl ProjectFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load a project file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            KernelError::Config(format!("Failed to read project file {:?}: {}", path, e))
        })?;
        Self::from_json(&content).with_context(|| format!("loading {:?}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let project: ProjectFile = serde_json::from_str(content)
            .map_err(|e| KernelError::Config(format!("Failed to parse project file: {}", e)))?;
        if project.version > PROJECT_VERSION {
            return Err(KernelError::Config(format!(
                "Unsupported project version {} (newest known is {})",
                project.version, PROJECT_VERSION
            )));
        }
        Ok(project)
    }

    /// Save project file to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KernelError::Config(format!("Failed to create project directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KernelError::Config(format!("Failed to serialize project: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            KernelError::Config(format!("Failed to write project file {:?}: {}", path, e))
        })
    }

    /// Add a module entry (builder style).
    pub fn with_module(mut self, kind: &str, label: &str) -> Self {
        self.modules.push(ModuleEntry {
            kind: kind.to_string(),
            label: label.to_string(),
            parameters: BTreeMap::new(),
            properties: BTreeMap::new(),
        });
        self
    }

    /// Set a parameter on the most recently added module.
    pub fn with_parameter(mut self, name: &str, value: ParameterValue) -> Self {
        if let Some(entry) = self.modules.last_mut() {
            entry.parameters.insert(name.to_string(), value);
        }
        self
    }

    pub fn with_connection(mut self, from: &str, to: &str) -> Self {
        self.connections.push(ConnectionEntry {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Check that every connection endpoint is a well-formed `label.slot`
    /// naming a module listed in the project.
    pub fn validate(&self) -> Result<()> {
        for connection in &self.connections {
            for endpoint in [&connection.from, &connection.to] {
                let address = SlotAddress::parse(endpoint).ok_or_else(|| {
                    KernelError::Config(format!("Malformed slot address '{}'", endpoint))
                })?;
                if !self.modules.iter().any(|m| m.label == address.module) {
                    return Err(KernelError::Config(format!(
                        "Connection endpoint '{}' names an unknown module",
                        endpoint
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the project's pipeline on `kernel`.
    pub fn apply(&self, kernel: &dyn Kernel) -> Result<()> {
        self.validate()?;

        let mut created = Vec::with_capacity(self.modules.len());
        for entry in &self.modules {
            let module = kernel
                .new_module(&entry.kind)
                .with_context(|| format!("creating module '{}'", entry.label))?;
            kernel.rename_module(&module, &entry.label)?;
            for (key, value) in &entry.properties {
                module.set_property(key.clone(), value.clone());
            }
            created.push(module);
        }

        for (entry, module) in self.modules.iter().zip(&created) {
            for (name, value) in &entry.parameters {
                module
                    .set_parameter_value(name, value.clone())
                    .with_context(|| format!("applying project parameters to '{}'", entry.label))?;
            }
        }

        for connection in &self.connections {
            kernel
                .connect(&connection.from, &connection.to)
                .with_context(|| format!("connecting {} -> {}", connection.from, connection.to))?;
        }

        tracing::info!(
            "Applied project '{}': {} modules, {} connections",
            self.name,
            created.len(),
            self.connections.len()
        );
        Ok(())
    }

    /// Describe the live pipeline of `kernel` as a project.
    pub fn capture(kernel: &dyn Kernel, name: impl Into<String>) -> Self {
        let mut project = Self::new(name);
        for module in kernel.get_modules() {
            let label = module.label();
            let parameters = module
                .parameters()
                .iter()
                .map(|p| (p.name.clone(), p.value().clone()))
                .collect();
            project.modules.push(ModuleEntry {
                kind: module.name().to_string(),
                label: label.clone(),
                parameters,
                properties: module.properties(),
            });
            for output in module.outputs() {
                for peer in output.peers() {
                    project.connections.push(ConnectionEntry {
                        from: format!("{}.{}", label, output.name()),
                        to: peer.qualified_name(),
                    });
                }
            }
        }
        project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_malformed_endpoint() {
        let project = ProjectFile::new("p")
            .with_module("Invert", "inv")
            .with_connection("inv", "inv.in");
        assert_eq!(project.validate().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_unknown_endpoint_module() {
        let project = ProjectFile::new("p")
            .with_module("Invert", "inv")
            .with_connection("src.out", "inv.in");
        assert_eq!(project.validate().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_json_defaults() {
        let project = ProjectFile::from_json(r#"{"modules":[{"kind":"NullSink","label":"sink"}]}"#)
            .unwrap();
        assert_eq!(project.version, PROJECT_VERSION);
        assert_eq!(project.modules[0].label, "sink");
        assert!(project.connections.is_empty());
    }

    #[test]
    fn test_future_version_rejected() {
        let err = ProjectFile::from_json(r#"{"version": 99}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(ProjectFile::from_json("not json").unwrap_err().kind(), ErrorKind::Config);
    }
}
