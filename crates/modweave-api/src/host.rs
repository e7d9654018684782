//! APIs the host and mods expose to each other.
//!
//! The host publishes services (registries, world access, sound players)
//! in an [`ApiRegistry`] keyed by their concrete type. Mods look them up
//! through [`ModContext::get_api`](crate::ModContext::get_api).
//!
//! Mods can publish their own APIs for other mods through the
//! [`ModInteractor`]. Those are keyed by the exposing mod's id and type and
//! only visible while that mod is loaded.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type SharedApi = Arc<dyn Any + Send + Sync>;

/// Type-keyed table of host services. Cloning shares the table.
#[derive(Clone, Default)]
pub struct ApiRegistry {
    instances: Arc<RwLock<HashMap<TypeId, SharedApi>>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an instance. Replaces any previous instance of the same type.
    pub fn register<T: Any + Send + Sync>(&self, instance: Arc<T>) {
        debug!("Registered host API {}", std::any::type_name::<T>());
        self.instances.write().insert(TypeId::of::<T>(), instance);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let instance = self.instances.read().get(&TypeId::of::<T>()).cloned()?;
        instance.downcast::<T>().ok()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.instances.read().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    pub fn clear(&self) {
        self.instances.write().clear();
    }
}

impl fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Default)]
struct Interactions {
    loaded: BTreeSet<String>,
    exposed: HashMap<(String, TypeId), SharedApi>,
}

/// Shared view of which mods are loaded and what they expose.
#[derive(Clone, Default)]
pub struct ModInteractor {
    inner: Arc<RwLock<Interactions>>,
}

impl ModInteractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mod_loaded(&self, mod_id: &str) -> bool {
        self.inner.read().loaded.contains(mod_id)
    }

    /// Ids of all loaded mods, sorted.
    pub fn loaded_mods(&self) -> Vec<String> {
        self.inner.read().loaded.iter().cloned().collect()
    }

    /// API of type `T` exposed by a loaded mod.
    pub fn mod_api<T: Any + Send + Sync>(&self, mod_id: &str) -> Option<Arc<T>> {
        let inner = self.inner.read();
        if !inner.loaded.contains(mod_id) {
            return None;
        }

        let api = inner
            .exposed
            .get(&(mod_id.to_string(), TypeId::of::<T>()))
            .cloned()?;
        api.downcast::<T>().ok()
    }

    pub(crate) fn expose<T: Any + Send + Sync>(&self, mod_id: &str, api: Arc<T>) {
        debug!(
            "Mod {} exposed API {}",
            mod_id,
            std::any::type_name::<T>()
        );
        self.inner
            .write()
            .exposed
            .insert((mod_id.to_string(), TypeId::of::<T>()), api);
    }

    pub(crate) fn mark_loaded(&self, mod_id: &str) {
        self.inner.write().loaded.insert(mod_id.to_string());
    }

    /// Drop everything a mod exposed, for mods that failed to initialize.
    pub(crate) fn forget(&self, mod_id: &str) {
        let mut inner = self.inner.write();
        inner.loaded.remove(mod_id);
        inner.exposed.retain(|(owner, _), _| owner != mod_id);
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        inner.loaded.clear();
        inner.exposed.clear();
    }
}

impl fmt::Debug for ModInteractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ModInteractor")
            .field("loaded", &inner.loaded)
            .field("exposed", &inner.exposed.len())
            .finish()
    }
}
