//! The per-mod view of the host.
//!
//! Every mod receives its own [`ModContext`] when it is initialized. The
//! context gives access to the mod's descriptor and configuration, a
//! logger tagged with the mod id, host APIs, the event bus, the resource
//! overlay and the APIs of other mods.

use crate::event::{Event, EventBus, ListenerId};
use crate::host::{ApiRegistry, ModInteractor};
use modweave_runtime::{
    Capability, CapabilitySet, ModDescriptor, ResourceOverlay, RuntimeError, RuntimeResult,
};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Logger whose records carry the owning mod's id.
#[derive(Debug, Clone)]
pub struct ModLogger {
    mod_id: Arc<str>,
}

impl ModLogger {
    pub fn new(mod_id: &str) -> Self {
        Self {
            mod_id: Arc::from(mod_id),
        }
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(target: "modweave::mod", mod_id = %self.mod_id, "{}", message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(target: "modweave::mod", mod_id = %self.mod_id, "{}", message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(target: "modweave::mod", mod_id = %self.mod_id, "{}", message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(target: "modweave::mod", mod_id = %self.mod_id, "{}", message);
    }
}

struct ContextInner {
    descriptor: Arc<ModDescriptor>,
    logger: ModLogger,
    capabilities: CapabilitySet,
    apis: ApiRegistry,
    api_cache: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    interactor: ModInteractor,
    event_bus: Arc<EventBus>,
    overlay: Arc<ResourceOverlay>,
}

/// Handle through which a mod talks to the host. Cheap to clone.
#[derive(Clone)]
pub struct ModContext {
    inner: Arc<ContextInner>,
}

impl ModContext {
    pub(crate) fn new(
        descriptor: Arc<ModDescriptor>,
        capabilities: CapabilitySet,
        apis: ApiRegistry,
        interactor: ModInteractor,
        event_bus: Arc<EventBus>,
        overlay: Arc<ResourceOverlay>,
    ) -> Self {
        let logger = ModLogger::new(descriptor.id());
        Self {
            inner: Arc::new(ContextInner {
                descriptor,
                logger,
                capabilities,
                apis,
                api_cache: RwLock::new(HashMap::new()),
                interactor,
                event_bus,
                overlay,
            }),
        }
    }

    pub fn mod_id(&self) -> &str {
        self.inner.descriptor.id()
    }

    pub fn descriptor(&self) -> &ModDescriptor {
        &self.inner.descriptor
    }

    /// Mod-specific configuration from the `[config]` table.
    pub fn config(&self) -> &BTreeMap<String, toml::Value> {
        &self.inner.descriptor.config
    }

    pub fn logger(&self) -> &ModLogger {
        &self.inner.logger
    }

    /// Capabilities granted to this mod.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.inner.capabilities
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.inner.capabilities.has(cap)
    }

    /// Fail with [`RuntimeError::PermissionDenied`] unless `cap` was granted.
    pub fn require(&self, cap: Capability) -> RuntimeResult<()> {
        if self.has_capability(cap) {
            Ok(())
        } else {
            Err(RuntimeError::PermissionDenied(format!(
                "mod '{}' was not granted '{}'",
                self.mod_id(),
                cap
            )))
        }
    }

    /// Look up a host API by type.
    ///
    /// Successful lookups are cached for the lifetime of this context.
    pub fn get_api<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.inner.api_cache.read().get(&key).cloned() {
            return cached.downcast::<T>().ok();
        }

        let api = self.inner.apis.get::<T>()?;
        self.inner.api_cache.write().insert(key, api.clone());
        Some(api)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    /// Subscribe to an event type. Requires [`Capability::EventListen`].
    pub fn subscribe<E, F>(&self, listener: F) -> RuntimeResult<ListenerId>
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.require(Capability::EventListen)?;
        Ok(self.inner.event_bus.subscribe(listener))
    }

    pub fn resources(&self) -> &ResourceOverlay {
        &self.inner.overlay
    }

    /// Physical location of a logical resource path, if any mod provides it.
    pub fn resource(&self, path: &str) -> Option<PathBuf> {
        self.inner.overlay.get(path)
    }

    pub fn interactor(&self) -> &ModInteractor {
        &self.inner.interactor
    }

    /// Publish an API for other mods under this mod's id.
    pub fn expose_api<T: Any + Send + Sync>(&self, api: Arc<T>) {
        self.inner.interactor.expose(self.mod_id(), api);
    }

    /// API exposed by another loaded mod. Requires [`Capability::ModInteract`].
    pub fn mod_api<T: Any + Send + Sync>(&self, mod_id: &str) -> RuntimeResult<Option<Arc<T>>> {
        self.require(Capability::ModInteract)?;
        Ok(self.inner.interactor.mod_api::<T>(mod_id))
    }
}

impl fmt::Debug for ModContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModContext")
            .field("mod_id", &self.mod_id())
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct World {
        seed: u64,
    }

    struct Tick {
        cancelled: bool,
    }

    impl Event for Tick {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }

        fn set_cancelled(&mut self, cancelled: bool) {
            self.cancelled = cancelled;
        }
    }

    fn context(capabilities: CapabilitySet, apis: ApiRegistry) -> ModContext {
        let mut descriptor = ModDescriptor::new("test:mod", "1.0.0");
        descriptor
            .config
            .insert("mana".to_string(), toml::Value::Integer(50));

        ModContext::new(
            Arc::new(descriptor),
            capabilities,
            apis,
            ModInteractor::new(),
            Arc::new(EventBus::new()),
            Arc::new(ResourceOverlay::new()),
        )
    }

    #[test]
    fn test_descriptor_and_config() {
        let ctx = context(CapabilitySet::all(), ApiRegistry::new());
        assert_eq!(ctx.mod_id(), "test:mod");
        assert_eq!(ctx.logger().mod_id(), "test:mod");
        assert_eq!(ctx.config()["mana"].as_integer(), Some(50));
    }

    #[test]
    fn test_get_api_is_cached() {
        let apis = ApiRegistry::new();
        apis.register(Arc::new(World { seed: 42 }));
        let ctx = context(CapabilitySet::all(), apis.clone());

        let first = ctx.get_api::<World>().unwrap();
        assert_eq!(first.seed, 42);

        // The context keeps serving its cached instance.
        apis.register(Arc::new(World { seed: 7 }));
        assert!(Arc::ptr_eq(&ctx.get_api::<World>().unwrap(), &first));
        assert!(ctx.get_api::<String>().is_none());
    }

    #[test]
    fn test_require_capability() {
        let ctx = context(
            [Capability::EventListen].into_iter().collect(),
            ApiRegistry::new(),
        );

        assert!(ctx.require(Capability::EventListen).is_ok());
        let err = ctx.require(Capability::WorldEdit).unwrap_err();
        assert!(matches!(err, RuntimeError::PermissionDenied(_)));
        assert!(err.to_string().contains("world_edit"));
    }

    #[test]
    fn test_subscribe_checks_capability() {
        let ctx = context(CapabilitySet::new(), ApiRegistry::new());
        assert!(ctx.subscribe(|_: &mut Tick| Ok(())).is_err());
        assert_eq!(ctx.event_bus().listener_count::<Tick>(), 0);

        let ctx = context(CapabilitySet::all(), ApiRegistry::new());
        ctx.subscribe(|_: &mut Tick| Ok(())).unwrap();
        assert_eq!(ctx.event_bus().listener_count::<Tick>(), 1);
    }

    #[test]
    fn test_mod_api_requires_mod_interact() {
        let ctx = context(CapabilitySet::new(), ApiRegistry::new());
        assert!(ctx.mod_api::<World>("other").is_err());

        let ctx = context(CapabilitySet::all(), ApiRegistry::new());
        ctx.expose_api(Arc::new(World { seed: 1 }));
        ctx.interactor().mark_loaded("test:mod");
        assert_eq!(ctx.mod_api::<World>("test:mod").unwrap().unwrap().seed, 1);
    }
}
