//! Error handling for the frameflow engine
//!
//! This module defines the engine error type and a Result alias used
//! throughout the crate. Errors are `Clone` so that a failure raised on the
//! kernel worker thread can be carried on every published `KernelState`.

use thiserror::Error;

/// Fieldless classification of a [`KernelError`].
///
/// Matching on the kind is stable even when an error has been wrapped with
/// context, so callers and tests should prefer it over the display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UseModule,
    LoadModule,
    CreateModule,
    DeleteModule,
    AlreadyLoadedModule,
    BuggyModule,
    InvalidSlot,
    InvalidImageSlot,
    NotConnectedSlot,
    AlreadyConnectedSlot,
    InvalidParameter,
    ModuleCycleDetected,
    InvalidOperationKernelState,
    InvalidOperationModuleState,
    InvalidSizeDimension,
    InvalidColorComponent,
    Config,
    Undefined,
}

/// Main error type for frameflow operations
#[derive(Error, Debug, Clone)]
pub enum KernelError {
    /// Runtime misuse of a module's slots or parameters
    #[error("Module '{module}' misuse: {message}")]
    UseModule { module: String, message: String },

    /// A module library or kind could not be loaded
    #[error("Load module error: {0}")]
    LoadModule(String),

    /// The factory could not instantiate a module
    #[error("Create module error: {0}")]
    CreateModule(String),

    /// A module could not be removed from the kernel
    #[error("Delete module error: {0}")]
    DeleteModule(String),

    /// A module kind was registered twice
    #[error("Module kind '{0}' is already loaded")]
    AlreadyLoadedModule(String),

    /// A module implementation broke one of its own invariants
    #[error("Buggy module '{module}': {message}")]
    BuggyModule { module: String, message: String },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Invalid image on slot: {0}")]
    InvalidImageSlot(String),

    #[error("Slot not connected: {0}")]
    NotConnectedSlot(String),

    #[error("Slot already connected: {0}")]
    AlreadyConnectedSlot(String),

    #[error("Invalid parameter '{parameter}' on module '{module}': {message}")]
    InvalidParameter {
        module: String,
        parameter: String,
        message: String,
    },

    /// The module graph contains a cycle; the payload is the offending path
    #[error("Module cycle detected: {0}")]
    ModuleCycleDetected(String),

    #[error("Cannot {operation} while kernel is {state}")]
    InvalidOperationKernelState {
        operation: &'static str,
        state: String,
    },

    #[error("Module '{module}' cannot {operation} while {state}")]
    InvalidOperationModuleState {
        module: String,
        operation: &'static str,
        state: String,
    },

    #[error("Invalid size dimension: {0}")]
    InvalidSizeDimension(String),

    #[error("Invalid color component: {0}")]
    InvalidColorComponent(String),

    /// Errors related to configuration and project file loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for unexpected failures crossing a module boundary
    #[error("Undefined error: {0}")]
    Undefined(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<KernelError>,
    },
}

impl KernelError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        KernelError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The kind of this error, looking through context layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::UseModule { .. } => ErrorKind::UseModule,
            KernelError::LoadModule(_) => ErrorKind::LoadModule,
            KernelError::CreateModule(_) => ErrorKind::CreateModule,
            KernelError::DeleteModule(_) => ErrorKind::DeleteModule,
            KernelError::AlreadyLoadedModule(_) => ErrorKind::AlreadyLoadedModule,
            KernelError::BuggyModule { .. } => ErrorKind::BuggyModule,
            KernelError::InvalidSlot(_) => ErrorKind::InvalidSlot,
            KernelError::InvalidImageSlot(_) => ErrorKind::InvalidImageSlot,
            KernelError::NotConnectedSlot(_) => ErrorKind::NotConnectedSlot,
            KernelError::AlreadyConnectedSlot(_) => ErrorKind::AlreadyConnectedSlot,
            KernelError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            KernelError::ModuleCycleDetected(_) => ErrorKind::ModuleCycleDetected,
            KernelError::InvalidOperationKernelState { .. } => {
                ErrorKind::InvalidOperationKernelState
            }
            KernelError::InvalidOperationModuleState { .. } => {
                ErrorKind::InvalidOperationModuleState
            }
            KernelError::InvalidSizeDimension(_) => ErrorKind::InvalidSizeDimension,
            KernelError::InvalidColorComponent(_) => ErrorKind::InvalidColorComponent,
            KernelError::Config(_) => ErrorKind::Config,
            KernelError::Undefined(_) => ErrorKind::Undefined,
            KernelError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Shorthand for a parameter validation failure
    pub fn invalid_parameter(
        module: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        KernelError::InvalidParameter {
            module: module.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for frameflow operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::NotConnectedSlot("blur.in".to_string());
        assert_eq!(err.to_string(), "Slot not connected: blur.in");
    }

    #[test]
    fn test_error_with_context_keeps_kind() {
        let err = KernelError::ModuleCycleDetected("a(out)->b(out)->a".to_string());
        let with_ctx = err.with_context("Failed to init");
        assert!(with_ctx.to_string().contains("Failed to init"));
        assert_eq!(with_ctx.kind(), ErrorKind::ModuleCycleDetected);
    }

    #[test]
    fn test_kernel_state_error_message() {
        let err = KernelError::InvalidOperationKernelState {
            operation: "start",
            state: "Uninitialized".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot start while kernel is Uninitialized");
        assert_eq!(err.kind(), ErrorKind::InvalidOperationKernelState);
    }

    #[test]
    fn test_result_ext_context() {
        let res: Result<()> = Err(KernelError::Undefined("boom".into()));
        let err = res.context("processing frame 3").unwrap_err();
        assert!(err.to_string().starts_with("processing frame 3"));
        assert_eq!(err.kind(), ErrorKind::Undefined);
    }
}
