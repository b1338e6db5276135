//! Kernel tuning (`kernel.toml`).

use crate::config::{ensure_app_data_dir, kernel_config_path, KERNEL_CONFIG_FILE};
use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings read when a kernel is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Capacity of the bounded command channel
    pub command_capacity: usize,
    /// Global frame bound; 0 leaves the bound to the modules
    pub max_frames: u64,
    /// Name of the worker thread
    pub worker_name: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            max_frames: 0,
            worker_name: "frameflow-kernel".to_string(),
        }
    }
}

impl KernelConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            KernelError::Config(format!("Failed to read kernel config {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("loading {:?}", path)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| KernelError::Config(format!("Failed to parse kernel config: {}", e)))
    }

    /// Load from the app data dir, returning defaults if the file is missing
    /// or unreadable
    pub fn load_or_default() -> Self {
        let Some(path) = kernel_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load kernel config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| KernelError::Config(format!("Failed to serialize kernel config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            KernelError::Config(format!("Failed to write kernel config {:?}: {}", path, e))
        })
    }

    /// Save to the app data dir
    pub fn save_default(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save(dir.join(KERNEL_CONFIG_FILE))
    }
}
