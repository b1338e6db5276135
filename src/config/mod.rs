//! Configuration for frameflow
//!
//! - [`KernelConfig`]: kernel tuning, stored as TOML (`kernel.toml`)
//! - [`ProjectFile`]: a saved pipeline (`.ffproj`, JSON) listing modules,
//!   their parameters and the slot connections between them
//!
//! # App Data Location
//!
//! The default kernel configuration is looked up in the platform data dir:
//! - **Linux**: `~/.local/share/dev.frameflow/`
//! - **macOS**: `~/Library/Application Support/dev.frameflow/`
//! - **Windows**: `%APPDATA%\dev.frameflow\`

pub mod kernel;
pub mod project;

pub use kernel::KernelConfig;
pub use project::{ConnectionEntry, ModuleEntry, ProjectFile};

use crate::error::{KernelError, Result};
use std::path::PathBuf;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.frameflow";

/// Kernel configuration filename
pub const KERNEL_CONFIG_FILE: &str = "kernel.toml";

/// Project file extension
pub const PROJECT_FILE_EXTENSION: &str = "ffproj";

/// Get the application data directory
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        KernelError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            KernelError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default kernel configuration file
pub fn kernel_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(KERNEL_CONFIG_FILE))
}
