//! Id-keyed registries for content contributed by mods.
//!
//! A [`Registry`] maps unique string ids to shared instances and remembers
//! insertion order. Each instance can be registered under at most one id,
//! so the id of a registered instance can be looked up from the instance
//! itself.
//!
//! Hosts usually create one registry per content kind (blocks, entities,
//! items) and hand it to the loader through
//! [`ModLoader::register_registry`](crate::ModLoader::register_registry),
//! which clears it again when mods are unloaded.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by [`Registry`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already taken in this registry.
    #[error("Duplicate id '{id}' in registry '{registry}'")]
    DuplicateId { registry: String, id: String },

    /// The same instance is already registered under another id.
    #[error("Instance already registered as '{existing}' in registry '{registry}'")]
    AlreadyRegistered { registry: String, existing: String },
}

/// Type-erased view of a registry, used to clear it on unload.
pub trait Clearable: Send + Sync {
    fn registry_name(&self) -> &str;
    fn clear_entries(&self);
    fn entry_count(&self) -> usize;
}

struct Entries<T> {
    order: Vec<String>,
    by_id: HashMap<String, Arc<T>>,
    by_instance: HashMap<usize, String>,
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
            by_instance: HashMap::new(),
        }
    }
}

/// A thread-safe, insertion-ordered id registry.
pub struct Registry<T> {
    name: String,
    entries: RwLock<Entries<T>>,
}

fn instance_key<T>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as usize
}

impl<T> Registry<T> {
    /// Create an empty registry. The name shows up in errors and logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a value under a new id and return the shared instance.
    pub fn register(&self, id: impl Into<String>, value: T) -> Result<Arc<T>, RegistryError> {
        let value = Arc::new(value);
        self.register_shared(id, Arc::clone(&value))?;
        Ok(value)
    }

    /// Register an existing shared instance under a new id.
    pub fn register_shared(
        &self,
        id: impl Into<String>,
        value: Arc<T>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let mut entries = self.entries.write();

        if entries.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateId {
                registry: self.name.clone(),
                id,
            });
        }

        let key = instance_key(&value);
        if let Some(existing) = entries.by_instance.get(&key) {
            return Err(RegistryError::AlreadyRegistered {
                registry: self.name.clone(),
                existing: existing.clone(),
            });
        }

        debug!("Registered '{}' in registry '{}'", id, self.name);
        entries.by_instance.insert(key, id.clone());
        entries.by_id.insert(id.clone(), value);
        entries.order.push(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries.read().by_id.get(id).cloned()
    }

    /// Id under which this exact instance was registered.
    pub fn get_id(&self, value: &Arc<T>) -> Option<String> {
        self.entries
            .read()
            .by_instance
            .get(&instance_key(value))
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().by_id.contains_key(id)
    }

    /// Snapshot of all ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Snapshot of all values in registration order.
    pub fn values(&self) -> Vec<Arc<T>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().order.is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!(
            "Clearing {} entries from registry '{}'",
            entries.order.len(),
            self.name
        );
        *entries = Entries::default();
    }
}

impl<T: Send + Sync> Clearable for Registry<T> {
    fn registry_name(&self) -> &str {
        self.name()
    }

    fn clear_entries(&self) {
        self.clear();
    }

    fn entry_count(&self) -> usize {
        self.len()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Block {
        hardness: u32,
    }

    #[test]
    fn test_register_and_get() {
        let blocks = Registry::new("blocks");
        let stone = blocks.register("stone", Block { hardness: 3 }).unwrap();

        assert_eq!(blocks.get("stone").unwrap().hardness, 3);
        assert!(Arc::ptr_eq(&blocks.get("stone").unwrap(), &stone));
        assert_eq!(blocks.get_id(&stone).as_deref(), Some("stone"));
        assert!(blocks.get("dirt").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let blocks = Registry::new("blocks");
        blocks.register("stone", Block { hardness: 3 }).unwrap();

        let err = blocks.register("stone", Block { hardness: 9 }).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateId {
                registry: "blocks".into(),
                id: "stone".into()
            }
        );
        assert_eq!(blocks.get("stone").unwrap().hardness, 3);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_same_instance_under_two_ids_rejected() {
        let blocks = Registry::new("blocks");
        let shared = Arc::new(Block { hardness: 1 });
        blocks.register_shared("a", Arc::clone(&shared)).unwrap();

        let err = blocks.register_shared("b", Arc::clone(&shared)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AlreadyRegistered { ref existing, .. } if existing == "a"
        ));
        assert!(!blocks.contains("b"));
    }

    #[test]
    fn test_equal_values_are_distinct_instances() {
        let blocks = Registry::new("blocks");
        let a = blocks.register("a", Block { hardness: 1 }).unwrap();
        let b = blocks.register("b", Block { hardness: 1 }).unwrap();

        assert_eq!(blocks.get_id(&a).as_deref(), Some("a"));
        assert_eq!(blocks.get_id(&b).as_deref(), Some("b"));
        assert!(blocks.get_id(&Arc::new(Block { hardness: 1 })).is_none());
    }

    #[test]
    fn test_insertion_order() {
        let blocks = Registry::new("blocks");
        for id in ["zinc", "apple", "moss"] {
            blocks.register(id, Block { hardness: 0 }).unwrap();
        }

        assert_eq!(blocks.ids(), vec!["zinc", "apple", "moss"]);
        assert_eq!(blocks.values().len(), 3);
    }

    #[test]
    fn test_clear() {
        let blocks = Registry::new("blocks");
        let stone = blocks.register("stone", Block { hardness: 3 }).unwrap();
        blocks.clear();

        assert!(blocks.is_empty());
        assert!(blocks.get_id(&stone).is_none());
        // Ids become available again after a clear.
        blocks.register("stone", Block { hardness: 4 }).unwrap();
    }

    #[test]
    fn test_concurrent_registration() {
        let blocks = Arc::new(Registry::new("blocks"));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let blocks = Arc::clone(&blocks);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        blocks
                            .register(format!("block_{t}_{i}"), Block { hardness: i })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(blocks.len(), 400);
    }
}
