//! # modweave-runtime
//!
//! Core mod runtime for modweave.
//!
//! This crate provides:
//! - Mod descriptor parsing (`mod.toml`)
//! - Mod discovery from a mods directory
//! - Dependency resolution with deterministic load ordering
//! - Capability-based permission checks
//! - The resource overlay that merges mod resource trees
//!
//! ## Mod Structure
//!
//! Mods are directories containing:
//! - `mod.toml` - Mod metadata, dependencies and permissions
//! - `assets/` - Resources merged into the host namespace (optional)
//!
//! ## Security Model
//!
//! Mods declare the capabilities they need. The [`PermissionManager`]
//! decides what each mod receives; in explicit mode a declared capability
//! the host withholds prevents the mod from loading.

pub mod capability;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod overlay;
pub mod resolver;

pub use capability::{Capability, CapabilitySet, PermissionCheck, PermissionManager};
pub use descriptor::{DependencySpec, LoadPriority, ModDescriptor, VersionConstraint};
pub use discovery::{discover_mod, DirectorySource, ModSource, StaticSource};
pub use error::{RuntimeError, RuntimeResult};
pub use overlay::{InjectStats, ResourceOverlay};
pub use resolver::{DependencyGraph, DependencyResolver};
