//! # frameflow: frame-synchronous image dataflow engine
//!
//! Pluggable processing modules expose typed input/output slots carrying
//! image buffers. A kernel orders them by topological level, drives their
//! lifecycle on a dedicated worker thread and publishes a state snapshot
//! after every transition.
//!
//! ## Architecture
//!
//! - **Pipeline**: modules, slots, parameters, graph leveling and the kernel
//! - **Config**: kernel tuning (TOML) and project files (JSON)
//! - **Image**: the opaque owned pixel buffer carried between slots
//!
//! ## Example
//!
//! ```ignore
//! use frameflow::config::KernelConfig;
//! use frameflow::pipeline::{Kernel, LifecycleState, SequentialKernel};
//!
//! let kernel = SequentialKernel::new(KernelConfig::default())?;
//! kernel.new_module("PatternSource")?;
//! kernel.new_module("NullSink")?;
//! kernel.connect("PatternSource1.out", "NullSink1.in")?;
//!
//! kernel.init()?;
//! let notifier = kernel.notifier();
//! while notifier.wait_notification().state != LifecycleState::Initialized {}
//! kernel.start()?;
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod pipeline;

// Re-export commonly used types
pub use config::{KernelConfig, ProjectFile};
pub use error::{ErrorKind, KernelError, Result, ResultExt};
pub use image::{Depth, Image};
pub use pipeline::{Kernel, KernelState, LifecycleState, Module, SequentialKernel};
