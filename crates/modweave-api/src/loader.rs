//! The mod loader.
//!
//! [`ModLoader`] drives the whole lifecycle:
//!
//! 1. scan the [`ModSource`] for descriptors;
//! 2. drop mods that do not support the running game version;
//! 3. resolve dependencies into a load order (any error aborts);
//! 4. for each mod in order: check permissions, inject its resources,
//!    load its entry point and call `on_init`.
//!
//! A failure in step 4 only affects that mod; the rest keep loading.
//! [`ModLoader::unload_all`] tears mods down in reverse load order and
//! clears everything mods contributed.

use crate::context::ModContext;
use crate::entry::{EntryLoader, LoadHandle, LoadedEntry, ModEntry};
use crate::event::{panic_message, EventBus, LoadingComplete, ModLoaded};
use crate::host::{ApiRegistry, ModInteractor};
use crate::registry::{Clearable, Registry};
use modweave_runtime::{
    Capability, DependencyResolver, ModDescriptor, ModSource, PermissionManager, ResourceOverlay,
    RuntimeError, RuntimeResult,
};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Directory inside a mod that holds its resource tree.
pub const ASSETS_DIR: &str = "assets";

/// Where the loader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Uninitialized,
    Scanning,
    Filtering,
    Resolving,
    /// Loading the mod at this position of the load order.
    Loading(usize),
    Ready,
    Unloading,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Uninitialized => f.write_str("uninitialized"),
            LoaderState::Scanning => f.write_str("scanning"),
            LoaderState::Filtering => f.write_str("filtering"),
            LoaderState::Resolving => f.write_str("resolving"),
            LoaderState::Loading(index) => write!(f, "loading #{}", index),
            LoaderState::Ready => f.write_str("ready"),
            LoaderState::Unloading => f.write_str("unloading"),
        }
    }
}

/// Step at which a mod failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Permissions,
    EntryPoint,
    Init,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStage::Permissions => f.write_str("permission check"),
            LoadStage::EntryPoint => f.write_str("entry point"),
            LoadStage::Init => f.write_str("initialization"),
        }
    }
}

/// A mod that was part of the load order but did not load.
#[derive(Debug)]
pub struct FailedMod {
    pub id: String,
    pub stage: LoadStage,
    pub error: RuntimeError,
}

/// A mod left out before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMod {
    pub id: String,
    pub reason: String,
}

/// Summary of [`ModLoader::initialize`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Ids in the order they were initialized.
    pub loaded: Vec<String>,
    pub failed: Vec<FailedMod>,
    pub skipped: Vec<SkippedMod>,
    pub warnings: Vec<String>,
    /// The loader was already ready; nothing was done.
    pub already_initialized: bool,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, id: &str) -> Option<&FailedMod> {
        self.failed.iter().find(|f| f.id == id)
    }
}

/// Summary of [`ModLoader::unload_all`].
#[derive(Debug, Default)]
pub struct UnloadReport {
    /// Ids in the order they were torn down.
    pub unloaded: Vec<String>,
    /// Mods whose `on_unload` failed, with the reason.
    pub errors: Vec<(String, String)>,
}

/// A mod that finished `on_init`.
struct LoadedMod {
    descriptor: Arc<ModDescriptor>,
    entry: Box<dyn ModEntry>,
    handle: LoadHandle,
    context: ModContext,
}

/// Orchestrates discovery, resolution, loading and teardown of mods.
pub struct ModLoader {
    state: LoaderState,
    source: Box<dyn ModSource>,
    entry_loader: Arc<dyn EntryLoader>,
    resolver: DependencyResolver,
    permissions: PermissionManager,
    event_bus: Arc<EventBus>,
    overlay: Arc<ResourceOverlay>,
    apis: ApiRegistry,
    interactor: ModInteractor,
    registries: Vec<Arc<dyn Clearable>>,
    mods: Vec<LoadedMod>,
}

impl ModLoader {
    pub fn new(source: impl ModSource + 'static, entry_loader: Arc<dyn EntryLoader>) -> Self {
        Self {
            state: LoaderState::Uninitialized,
            source: Box::new(source),
            entry_loader,
            resolver: DependencyResolver::new(),
            permissions: PermissionManager::new(),
            event_bus: Arc::new(EventBus::new()),
            overlay: Arc::new(ResourceOverlay::new()),
            apis: ApiRegistry::new(),
            interactor: ModInteractor::new(),
            registries: Vec::new(),
            mods: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: PermissionManager) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_resolver(mut self, resolver: DependencyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Discover, resolve and initialize all mods for `game_version`.
    ///
    /// Scan and resolution errors abort and leave the loader uninitialized.
    /// Per-mod failures are collected in the report instead.
    pub fn initialize(&mut self, game_version: &str) -> RuntimeResult<LoadReport> {
        if self.state == LoaderState::Ready {
            info!("Mod loader already initialized");
            return Ok(LoadReport {
                already_initialized: true,
                ..Default::default()
            });
        }

        info!("Initializing mod loader for game version {}", game_version);
        let mut report = LoadReport::default();

        self.state = LoaderState::Scanning;
        let discovered = match self.source.scan() {
            Ok(discovered) => discovered,
            Err(e) => {
                error!("Mod scan failed: {}", e);
                self.state = LoaderState::Uninitialized;
                return Err(e);
            }
        };

        if discovered.is_empty() {
            info!("No mods found");
            self.finish(&report);
            return Ok(report);
        }

        self.state = LoaderState::Filtering;
        let compatible = Self::filter_compatible(discovered, game_version, &mut report);

        self.state = LoaderState::Resolving;
        let order = match self.resolver.resolve(&compatible) {
            Ok(order) => order,
            Err(e) => {
                error!("Dependency resolution failed: {}", e);
                self.state = LoaderState::Uninitialized;
                return Err(e);
            }
        };
        debug!(
            "Load order: {}",
            order.iter().map(|m| m.id()).collect::<Vec<_>>().join(", ")
        );

        for (index, descriptor) in order.into_iter().enumerate() {
            self.state = LoaderState::Loading(index);
            match self.load_mod(descriptor, &mut report) {
                Ok(loaded) => {
                    info!(
                        "Loaded mod {} v{}",
                        loaded.descriptor.id(),
                        loaded.descriptor.version()
                    );
                    report.loaded.push(loaded.descriptor.id().to_string());
                    let mut event =
                        ModLoaded::new(loaded.descriptor.id(), loaded.descriptor.version());
                    self.mods.push(loaded);
                    self.event_bus.post(&mut event);
                }
                Err(failure) => {
                    error!(
                        "Failed to load mod {} during {}: {}",
                        failure.id, failure.stage, failure.error
                    );
                    report.failed.push(failure);
                }
            }
        }

        self.finish(&report);
        Ok(report)
    }

    fn finish(&mut self, report: &LoadReport) {
        self.state = LoaderState::Ready;
        info!(
            "Mod loading complete: {} loaded, {} failed, {} skipped",
            report.loaded.len(),
            report.failed.len(),
            report.skipped.len()
        );
        let mut event = LoadingComplete::new(report.loaded.len(), report.failed.len());
        self.event_bus.post(&mut event);
    }

    fn filter_compatible(
        discovered: BTreeMap<String, ModDescriptor>,
        game_version: &str,
        report: &mut LoadReport,
    ) -> BTreeMap<String, ModDescriptor> {
        discovered
            .into_iter()
            .filter(|(id, descriptor)| {
                if descriptor.is_compatible_with(game_version) {
                    return true;
                }

                let reason = format!(
                    "supports game versions [{}], not {}",
                    descriptor.meta.game_versions.join(", "),
                    game_version
                );
                warn!("Skipping mod {}: {}", id, reason);
                report.skipped.push(SkippedMod {
                    id: id.clone(),
                    reason,
                });
                false
            })
            .collect()
    }

    /// Load one mod: permissions, resources, entry point, then `on_init`.
    ///
    /// Resources under `assets/` are injected only when the mod holds
    /// `resource_inject`; without it they are skipped with a warning.
    fn load_mod(
        &self,
        descriptor: &ModDescriptor,
        report: &mut LoadReport,
    ) -> Result<LoadedMod, FailedMod> {
        let id = descriptor.id();
        let fail = |stage, error| FailedMod {
            id: id.to_string(),
            stage,
            error,
        };
        debug!("Loading mod {} ({})", descriptor.name(), id);

        let check = self.permissions.validate(descriptor);
        for warning in &check.warnings {
            warn!("Mod {}: {}", id, warning);
            report.warnings.push(format!("{}: {}", id, warning));
        }
        if !check.is_valid() {
            return Err(fail(
                LoadStage::Permissions,
                RuntimeError::PermissionDenied(check.errors.join("; ")),
            ));
        }

        if let Some(root) = descriptor.root() {
            if check.granted.has(Capability::ResourceInject) {
                if let Err(e) = self.overlay.inject(descriptor, &root.join(ASSETS_DIR)) {
                    warn!("{}", e);
                    report.warnings.push(e.to_string());
                }
            } else if root.join(ASSETS_DIR).is_dir() {
                let warning = format!(
                    "{}: resources not injected, '{}' was not granted",
                    id,
                    Capability::ResourceInject
                );
                warn!("{}", warning);
                report.warnings.push(warning);
            }
        }

        let loaded = catch_unwind(AssertUnwindSafe(|| {
            self.entry_loader.load(descriptor, descriptor.root())
        }));
        let LoadedEntry { mut entry, handle } = match loaded {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) => return Err(fail(LoadStage::EntryPoint, e)),
            Err(panic) => {
                return Err(fail(
                    LoadStage::EntryPoint,
                    RuntimeError::EntryLoad {
                        entry_point: descriptor.entry_point().to_string(),
                        reason: panic_message(panic.as_ref()),
                    },
                ))
            }
        };

        let descriptor = Arc::new(descriptor.clone());
        let context = ModContext::new(
            Arc::clone(&descriptor),
            check.granted,
            self.apis.clone(),
            self.interactor.clone(),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.overlay),
        );

        let reason = match catch_unwind(AssertUnwindSafe(|| entry.on_init(&context))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };

        if let Some(reason) = reason {
            self.interactor.forget(id);
            drop(entry);
            if let Err(e) = self.entry_loader.release(&handle) {
                warn!("Failed to release entry of {}: {}", id, e);
            }
            return Err(fail(
                LoadStage::Init,
                RuntimeError::InitializationFailed(format!("{}: {}", id, reason)),
            ));
        }

        self.interactor.mark_loaded(id);
        Ok(LoadedMod {
            descriptor,
            entry,
            handle,
            context,
        })
    }

    /// Tear down every loaded mod in reverse load order.
    ///
    /// Only valid in the ready state; otherwise nothing happens. Afterwards
    /// the loader is uninitialized and may be initialized again.
    pub fn unload_all(&mut self) -> UnloadReport {
        let mut report = UnloadReport::default();
        if self.state != LoaderState::Ready {
            warn!("Cannot unload mods while {}", self.state);
            return report;
        }

        self.state = LoaderState::Unloading;
        info!("Unloading {} mods", self.mods.len());

        while let Some(mut loaded) = self.mods.pop() {
            let id = loaded.descriptor.id().to_string();
            match catch_unwind(AssertUnwindSafe(|| loaded.entry.on_unload())) {
                Ok(Ok(())) => debug!("Unloaded mod {}", id),
                Ok(Err(e)) => {
                    error!("Error unloading mod {}: {:#}", id, e);
                    report.errors.push((id.clone(), format!("{:#}", e)));
                }
                Err(panic) => {
                    let reason = format!("panicked: {}", panic_message(panic.as_ref()));
                    error!("Error unloading mod {}: {}", id, reason);
                    report.errors.push((id.clone(), reason));
                }
            }

            let LoadedMod { entry, handle, .. } = loaded;
            drop(entry);
            if let Err(e) = self.entry_loader.release(&handle) {
                warn!("Failed to release entry of {}: {}", id, e);
            }
            report.unloaded.push(id);
        }

        for registry in &self.registries {
            debug!(
                "Clearing registry '{}' ({} entries)",
                registry.registry_name(),
                registry.entry_count()
            );
            registry.clear_entries();
        }
        self.event_bus.clear();
        self.overlay.clear();
        self.interactor.clear();

        self.state = LoaderState::Uninitialized;
        info!("All mods unloaded");
        report
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn is_loaded(&self, mod_id: &str) -> bool {
        self.interactor.is_mod_loaded(mod_id)
    }

    /// Descriptors of loaded mods, in load order.
    pub fn loaded_mods(&self) -> Vec<Arc<ModDescriptor>> {
        self.mods
            .iter()
            .map(|m| Arc::clone(&m.descriptor))
            .collect()
    }

    /// Context handed to a loaded mod.
    pub fn context(&self, mod_id: &str) -> Option<&ModContext> {
        self.mods
            .iter()
            .find(|m| m.descriptor.id() == mod_id)
            .map(|m| &m.context)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn overlay(&self) -> &Arc<ResourceOverlay> {
        &self.overlay
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    pub fn interactor(&self) -> &ModInteractor {
        &self.interactor
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn permissions_mut(&mut self) -> &mut PermissionManager {
        &mut self.permissions
    }

    /// Publish a host API to mods.
    pub fn register_api<T: Any + Send + Sync>(&self, api: Arc<T>) {
        self.apis.register(api);
    }

    /// Publish a registry to mods and clear it whenever mods are unloaded.
    pub fn register_registry<T: Send + Sync + 'static>(&mut self, registry: Arc<Registry<T>>) {
        self.apis.register(Arc::clone(&registry));
        self.registries.push(registry);
    }
}

impl fmt::Debug for ModLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModLoader")
            .field("state", &self.state)
            .field("loaded", &self.mods.len())
            .field("registries", &self.registries.len())
            .finish_non_exhaustive()
    }
}
