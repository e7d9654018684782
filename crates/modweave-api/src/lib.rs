//! # modweave-api
//!
//! The API mods are written against, and the loader that runs them.
//!
//! - [`ModEntry`] is implemented by every mod; [`EntryLoader`] turns an
//!   entry point reference into one.
//! - [`ModContext`] is the mod's view of the host: configuration, logging,
//!   host APIs, events, resources and other mods.
//! - [`Registry`] and [`EventBus`] are the shared extension points.
//! - [`ModLoader`] ties it all together.
//!
//! ## Example
//!
//! ```no_run
//! use modweave_api::{BuiltinEntryLoader, ModContext, ModEntry, ModLoader};
//! use modweave_runtime::DirectorySource;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Hello;
//!
//! impl ModEntry for Hello {
//!     fn on_init(&mut self, ctx: &ModContext) -> anyhow::Result<()> {
//!         ctx.logger().info("hello from a mod");
//!         Ok(())
//!     }
//! }
//!
//! let mut entries = BuiltinEntryLoader::new();
//! entries.register::<Hello>("example:hello");
//!
//! let mut loader = ModLoader::new(DirectorySource::new("mods"), Arc::new(entries));
//! let report = loader.initialize("1.0.0")?;
//! println!("loaded {} mods", report.loaded.len());
//! loader.unload_all();
//! # Ok::<(), modweave_runtime::RuntimeError>(())
//! ```

pub mod context;
pub mod entry;
pub mod event;
pub mod host;
pub mod loader;
pub mod registry;

pub use context::{ModContext, ModLogger};
pub use entry::{BuiltinEntryLoader, EntryLoader, EntryPoint, LoadHandle, LoadedEntry, ModEntry};
pub use event::{Event, EventBus, ListenerId, LoadingComplete, ModLoaded, PostSummary};
pub use host::{ApiRegistry, ModInteractor};
pub use loader::{
    FailedMod, LoadReport, LoadStage, LoaderState, ModLoader, SkippedMod, UnloadReport, ASSETS_DIR,
};
pub use registry::{Clearable, Registry, RegistryError};

// Re-export runtime types mods commonly need
pub use modweave_runtime::{Capability, CapabilitySet, ModDescriptor, RuntimeError, RuntimeResult};
