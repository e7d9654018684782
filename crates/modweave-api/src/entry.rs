//! Mod entry points and the loaders that produce them.
//!
//! A descriptor's `entry_point` names the code that should run when the
//! mod is initialized. An [`EntryLoader`] turns that reference into a live
//! [`ModEntry`] together with a [`LoadHandle`] that must be released when
//! the mod is unloaded.
//!
//! The bundled [`BuiltinEntryLoader`] resolves entry points against
//! factories compiled into the host. Entry references have the form
//! `name` or `builtin:name`.

use crate::context::ModContext;
use chrono::{DateTime, Utc};
use modweave_runtime::{ModDescriptor, RuntimeError, RuntimeResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Code a mod runs when it is initialized and unloaded.
pub trait ModEntry: Send {
    /// Called once, after the mod's dependencies have been initialized.
    fn on_init(&mut self, ctx: &ModContext) -> anyhow::Result<()>;

    /// Called once during teardown, in reverse load order.
    fn on_unload(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Which kind of code an entry reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// An entry compiled into the host.
    Builtin(String),
    /// A shared library on disk.
    Library(String),
}

impl EntryPoint {
    /// Parse an entry reference.
    ///
    /// Only `builtin:`, `lib:` and `dylib:` prefixes are treated as schemes;
    /// anything else (including namespaced `owner:name` references) is a
    /// builtin name as written.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        if let Some(name) = reference.strip_prefix("builtin:") {
            return EntryPoint::Builtin(name.to_string());
        }

        for scheme in ["lib:", "dylib:"] {
            if let Some(path) = reference.strip_prefix(scheme) {
                return EntryPoint::Library(path.to_string());
            }
        }

        EntryPoint::Builtin(reference.to_string())
    }

    pub fn target(&self) -> &str {
        match self {
            EntryPoint::Builtin(name) | EntryPoint::Library(name) => name,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Builtin(name) => write!(f, "builtin:{}", name),
            EntryPoint::Library(path) => write!(f, "lib:{}", path),
        }
    }
}

/// Proof that an entry was loaded. Returned to the loader on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadHandle {
    serial: u64,
    mod_id: String,
    entry_point: EntryPoint,
    loaded_at: DateTime<Utc>,
}

impl LoadHandle {
    pub fn new(serial: u64, mod_id: impl Into<String>, entry_point: EntryPoint) -> Self {
        Self {
            serial,
            mod_id: mod_id.into(),
            entry_point,
            loaded_at: Utc::now(),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// A freshly loaded entry and the handle that keeps it alive.
pub struct LoadedEntry {
    pub entry: Box<dyn ModEntry>,
    pub handle: LoadHandle,
}

impl fmt::Debug for LoadedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedEntry")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Turns entry references into live mod entries.
pub trait EntryLoader: Send + Sync {
    /// Load the entry named by `descriptor`. `root` is the mod's directory,
    /// if it has one.
    fn load(&self, descriptor: &ModDescriptor, root: Option<&Path>) -> RuntimeResult<LoadedEntry>;

    /// Release a handle returned by [`load`](Self::load).
    fn release(&self, handle: &LoadHandle) -> RuntimeResult<()>;
}

type EntryFactory = Box<dyn Fn() -> Box<dyn ModEntry> + Send + Sync>;

/// Entry loader backed by factories compiled into the host.
#[derive(Default)]
pub struct BuiltinEntryLoader {
    factories: BTreeMap<String, EntryFactory>,
    live: Mutex<HashSet<u64>>,
    next_serial: AtomicU64,
}

impl BuiltinEntryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry type constructed with `Default`.
    pub fn register<E>(&mut self, name: impl Into<String>) -> &mut Self
    where
        E: ModEntry + Default + 'static,
    {
        self.register_with(name, || Box::new(E::default()) as Box<dyn ModEntry>)
    }

    /// Register a factory for an entry name. Replaces an existing factory.
    pub fn register_with<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn ModEntry> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered builtin entry '{}'", name);
        self.factories.insert(name, Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered entries, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Number of handles loaded and not yet released.
    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }
}

impl EntryLoader for BuiltinEntryLoader {
    fn load(&self, descriptor: &ModDescriptor, _root: Option<&Path>) -> RuntimeResult<LoadedEntry> {
        let entry_point = EntryPoint::parse(descriptor.entry_point());

        let name = match &entry_point {
            EntryPoint::Builtin(name) => name,
            EntryPoint::Library(_) => {
                return Err(RuntimeError::InvalidEntryType(format!(
                    "{} (shared libraries are not supported by the builtin loader)",
                    entry_point
                )))
            }
        };

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RuntimeError::EntryLoad {
                entry_point: entry_point.to_string(),
                reason: "no builtin entry registered under this name".to_string(),
            })?;

        let entry = factory();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(serial);

        info!("Loaded entry {} for {}", entry_point, descriptor.id());
        Ok(LoadedEntry {
            entry,
            handle: LoadHandle::new(serial, descriptor.id(), entry_point),
        })
    }

    fn release(&self, handle: &LoadHandle) -> RuntimeResult<()> {
        if self.live.lock().remove(&handle.serial()) {
            debug!("Released entry {} for {}", handle.entry_point(), handle.mod_id());
            Ok(())
        } else {
            Err(RuntimeError::EntryLoad {
                entry_point: handle.entry_point().to_string(),
                reason: "handle is not live".to_string(),
            })
        }
    }
}

impl fmt::Debug for BuiltinEntryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinEntryLoader")
            .field("entries", &self.names())
            .field("live", &self.live_handles())
            .finish()
    }
}
