//! Error types for the modweave runtime.

use thiserror::Error;

/// Errors that can occur while discovering, resolving or loading mods.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Failed to parse or validate a mod descriptor.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A required dependency is not part of the discovered set.
    #[error("Mod '{module}' requires '{dependency}', which was not found")]
    MissingDependency { module: String, dependency: String },

    /// A required dependency is present with an incompatible version.
    #[error("Mod '{module}' requires '{dependency}:{required}', but found version '{found}'")]
    VersionMismatch {
        module: String,
        dependency: String,
        required: String,
        found: String,
    },

    /// The dependency graph contains at least one cycle.
    #[error("Cyclic dependency detected between: {}", .involved.join(", "))]
    CyclicDependency { involved: Vec<String> },

    /// A mod lacks a capability it needs.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Merging a mod's resources into the overlay failed.
    #[error("Resource injection failed for '{module}': {reason}")]
    ResourceInjection { module: String, reason: String },

    /// The entry point could not be loaded.
    #[error("Failed to load entry point '{entry_point}': {reason}")]
    EntryLoad { entry_point: String, reason: String },

    /// The entry point reference names something that is not a mod entry.
    #[error("Invalid entry type '{0}'")]
    InvalidEntryType(String),

    /// The mod failed to initialize.
    #[error("Mod initialization failed: {0}")]
    InitializationFailed(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RuntimeError {
    /// Whether this error belongs to the resolution phase, which aborts
    /// initialization as a whole.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            RuntimeError::MissingDependency { .. }
                | RuntimeError::VersionMismatch { .. }
                | RuntimeError::CyclicDependency { .. }
        )
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
