//! Capability-based permission model for mods.
//!
//! Mods declare the capabilities they need in their descriptor. The
//! [`PermissionManager`] decides which of them a mod actually receives.
//!
//! By default every known capability is granted and declarations are
//! informational only. In explicit mode a mod receives only what it
//! declared *and* what the host has granted; declaring a capability the
//! host withholds is an error that stops the mod from loading.

use crate::descriptor::ModDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A capability that a mod can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Inject textures, sounds and models into the resource overlay.
    ResourceInject,

    /// Change world generation rules.
    WorldEdit,

    /// Register new block types.
    BlockRegister,

    /// Register new entities.
    EntityRegister,

    /// Listen to core game events.
    EventListen,

    /// Call APIs exposed by other mods.
    ModInteract,
}

impl Capability {
    /// Every capability the runtime knows about.
    pub const ALL: [Capability; 6] = [
        Capability::ResourceInject,
        Capability::WorldEdit,
        Capability::BlockRegister,
        Capability::EntityRegister,
        Capability::EventListen,
        Capability::ModInteract,
    ];

    /// Parse a capability identifier, ignoring case.
    ///
    /// Returns `None` for identifiers the runtime doesn't know.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resource_inject" => Some(Capability::ResourceInject),
            "world_edit" => Some(Capability::WorldEdit),
            "block_register" => Some(Capability::BlockRegister),
            "entity_register" => Some(Capability::EntityRegister),
            "event_listen" => Some(Capability::EventListen),
            "mod_interact" => Some(Capability::ModInteract),
            _ => None,
        }
    }

    /// Convert capability to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ResourceInject => "resource_inject",
            Capability::WorldEdit => "world_edit",
            Capability::BlockRegister => "block_register",
            Capability::EntityRegister => "entity_register",
            Capability::EventListen => "event_listen",
            Capability::ModInteract => "mod_interact",
        }
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Capability::ResourceInject => "inject custom textures, sounds and models",
            Capability::WorldEdit => "modify terrain, biome and ore generation",
            Capability::BlockRegister => "register new blocks and block traits",
            Capability::EntityRegister => "register new creatures and items",
            Capability::EventListen => "listen to player actions and world events",
            Capability::ModInteract => "call APIs exposed by other mods",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding every known capability.
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Add a capability to the set.
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Remove a capability from the set.
    pub fn remove(&mut self, cap: Capability) -> bool {
        self.capabilities.remove(&cap)
    }

    /// Check if the set contains a capability.
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Get all capabilities in the set, in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

/// Outcome of validating a mod's declared permissions.
#[derive(Debug, Clone, Default)]
pub struct PermissionCheck {
    /// Capabilities the mod receives.
    pub granted: CapabilitySet,
    /// Non-fatal findings, such as unknown identifiers.
    pub warnings: Vec<String>,
    /// Fatal findings. Any entry here stops the mod from loading.
    pub errors: Vec<String>,
}

impl PermissionCheck {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Evaluates mod permission declarations against the host's grant set.
#[derive(Debug, Clone)]
pub struct PermissionManager {
    granted: CapabilitySet,
    explicit: bool,
}

impl PermissionManager {
    /// All capabilities granted, explicit mode off.
    pub fn new() -> Self {
        Self {
            granted: CapabilitySet::all(),
            explicit: false,
        }
    }

    /// Explicit mode with the given grant set.
    pub fn explicit(granted: CapabilitySet) -> Self {
        Self {
            granted,
            explicit: true,
        }
    }

    pub fn grant(&mut self, cap: Capability) {
        self.granted.add(cap);
    }

    pub fn revoke(&mut self, cap: Capability) {
        self.granted.remove(cap);
    }

    pub fn set_explicit(&mut self, explicit: bool) {
        self.explicit = explicit;
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// The host's current grant set.
    pub fn granted(&self) -> &CapabilitySet {
        &self.granted
    }

    /// Check whether a mod holds a capability under the current policy.
    pub fn has_permission(&self, descriptor: &ModDescriptor, cap: Capability) -> bool {
        if !self.explicit {
            return self.granted.has(cap);
        }

        let declared = descriptor
            .permissions
            .iter()
            .any(|p| Capability::parse(p) == Some(cap));

        declared && self.granted.has(cap)
    }

    /// Validate all permissions declared by a mod.
    pub fn validate(&self, descriptor: &ModDescriptor) -> PermissionCheck {
        let mut check = PermissionCheck::default();

        if !self.explicit {
            check.granted = self.granted.clone();
        }

        for declared in &descriptor.permissions {
            match Capability::parse(declared) {
                None => check
                    .warnings
                    .push(format!("Unknown permission: {}", declared)),
                Some(cap) if !self.has_permission(descriptor, cap) => check.errors.push(format!(
                    "Missing permission: {} ({})",
                    cap,
                    cap.description()
                )),
                Some(cap) => check.granted.add(cap),
            }
        }

        check
    }
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(permissions: &[&str]) -> ModDescriptor {
        permissions
            .iter()
            .fold(ModDescriptor::new("test:mod", "1.0.0"), |d, p| {
                d.with_permission(*p)
            })
    }

    #[test]
    fn test_parse_capability() {
        assert_eq!(
            Capability::parse("RESOURCE_INJECT"),
            Some(Capability::ResourceInject)
        );
        assert_eq!(Capability::parse("world_edit"), Some(Capability::WorldEdit));
        assert_eq!(Capability::parse("teleport"), None);

        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
    }

    #[test]
    fn test_default_mode_grants_everything() {
        let manager = PermissionManager::new();
        let check = manager.validate(&descriptor(&["block_register"]));

        assert!(check.is_valid());
        assert_eq!(check.granted.len(), Capability::ALL.len());
        assert!(check.granted.has(Capability::WorldEdit));
    }

    #[test]
    fn test_default_mode_follows_revocations() {
        let mut manager = PermissionManager::new();
        manager.revoke(Capability::WorldEdit);

        let check = manager.validate(&descriptor(&[]));
        assert!(check.is_valid());
        assert!(!check.granted.has(Capability::WorldEdit));

        let check = manager.validate(&descriptor(&["world_edit"]));
        assert!(!check.is_valid());
    }

    #[test]
    fn test_unknown_permission_is_warning() {
        let manager = PermissionManager::new();
        let check = manager.validate(&descriptor(&["fly"]));

        assert!(check.is_valid());
        assert_eq!(check.warnings.len(), 1);
        assert!(check.warnings[0].contains("fly"));
    }

    #[test]
    fn test_explicit_mode() {
        let mut manager =
            PermissionManager::explicit([Capability::EventListen].into_iter().collect());

        let check = manager.validate(&descriptor(&["event_listen"]));
        assert!(check.is_valid());
        assert_eq!(check.granted.iter().collect::<Vec<_>>(), vec![Capability::EventListen]);

        let check = manager.validate(&descriptor(&["event_listen", "world_edit"]));
        assert!(!check.is_valid());
        assert_eq!(check.errors.len(), 1);

        manager.grant(Capability::WorldEdit);
        let check = manager.validate(&descriptor(&["event_listen", "world_edit"]));
        assert!(check.is_valid());
        assert_eq!(check.granted.len(), 2);
    }

    #[test]
    fn test_explicit_mode_undeclared_not_granted() {
        let manager = PermissionManager::explicit(CapabilitySet::all());
        let d = descriptor(&["event_listen"]);

        assert!(manager.has_permission(&d, Capability::EventListen));
        assert!(!manager.has_permission(&d, Capability::WorldEdit));
        assert!(!manager.validate(&d).granted.has(Capability::WorldEdit));
    }
}
