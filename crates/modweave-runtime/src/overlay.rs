//! Resource overlay.
//!
//! Every mod may ship a resource tree. The overlay merges all trees into a
//! single logical namespace where each logical path (`textures/stone.png`)
//! resolves to exactly one physical file.
//!
//! When two mods provide the same path the higher load priority wins; on
//! equal priority the mod whose id sorts later wins. The rule is a total
//! order over owners, so the result does not depend on injection order.

use crate::descriptor::{LoadPriority, ModDescriptor};
use crate::error::{RuntimeError, RuntimeResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// The mapping currently visible for one logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OverlayEntry {
    physical: PathBuf,
    owner: String,
    priority: LoadPriority,
}

impl OverlayEntry {
    fn is_overridden_by(&self, owner: &str, priority: LoadPriority) -> bool {
        priority > self.priority || (priority == self.priority && owner > self.owner.as_str())
    }
}

/// Counters describing a single injection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectStats {
    /// Paths nobody provided before.
    pub added: usize,
    /// Paths taken over from another mod.
    pub overridden: usize,
    /// Paths kept by an existing owner.
    pub shadowed: usize,
}

impl InjectStats {
    pub fn total(&self) -> usize {
        self.added + self.overridden + self.shadowed
    }
}

/// Merged view of all injected resource trees.
#[derive(Debug, Default)]
pub struct ResourceOverlay {
    entries: RwLock<HashMap<String, OverlayEntry>>,
}

impl ResourceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `root` recursively and merge every file into the overlay.
    ///
    /// A missing `root` is not an error; the mod simply has no resources.
    pub fn inject(&self, descriptor: &ModDescriptor, root: &Path) -> RuntimeResult<InjectStats> {
        if !root.is_dir() {
            trace!("No resource tree for {} at {:?}", descriptor.id(), root);
            return Ok(InjectStats::default());
        }

        let mut files = Vec::new();
        collect_files(root, &mut files).map_err(|e| RuntimeError::ResourceInjection {
            module: descriptor.id().to_string(),
            reason: e.to_string(),
        })?;

        let mut stats = InjectStats::default();
        let mut entries = self.entries.write();

        for file in files {
            let Some(logical) = logical_path(root, &file) else {
                continue;
            };

            match entries.get_mut(&logical) {
                None => {
                    entries.insert(
                        logical,
                        OverlayEntry {
                            physical: file,
                            owner: descriptor.id().to_string(),
                            priority: descriptor.priority(),
                        },
                    );
                    stats.added += 1;
                }
                Some(existing)
                    if existing.is_overridden_by(descriptor.id(), descriptor.priority()) =>
                {
                    trace!(
                        "{} overrides {} (owned by {})",
                        descriptor.id(),
                        logical,
                        existing.owner
                    );
                    *existing = OverlayEntry {
                        physical: file,
                        owner: descriptor.id().to_string(),
                        priority: descriptor.priority(),
                    };
                    stats.overridden += 1;
                }
                Some(_) => stats.shadowed += 1,
            }
        }

        debug!(
            "Injected resources for {}: {} added, {} overridden, {} shadowed",
            descriptor.id(),
            stats.added,
            stats.overridden,
            stats.shadowed
        );
        Ok(stats)
    }

    /// Physical location currently winning for a logical path.
    pub fn get(&self, path: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .get(&normalize(path))
            .map(|e| e.physical.clone())
    }

    pub fn has(&self, path: &str) -> bool {
        self.entries.read().contains_key(&normalize(path))
    }

    /// Mod currently owning a logical path.
    pub fn owner_of(&self, path: &str) -> Option<String> {
        self.entries
            .read()
            .get(&normalize(path))
            .map(|e| e.owner.clone())
    }

    /// All logical paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        // Symlinked directories are not followed; a link back up the tree
        // would never terminate.
        let file_type = std::fs::symlink_metadata(&path)?.file_type();
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_symlink() && path.is_dir() {
            trace!("Skipping symlinked directory {:?}", path);
        } else {
            files.push(path);
        }
    }

    Ok(())
}

fn logical_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, relative).unwrap();
    }

    fn owner(id: &str, priority: LoadPriority) -> ModDescriptor {
        ModDescriptor::new(id, "1.0").with_priority(priority)
    }

    #[test]
    fn test_inject_nested_tree() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "textures/blocks/stone.png");
        write(temp.path(), "sounds/step.ogg");

        let overlay = ResourceOverlay::new();
        let stats = overlay
            .inject(&owner("a", LoadPriority::Normal), temp.path())
            .unwrap();

        assert_eq!(stats.added, 2);
        assert_eq!(
            overlay.paths(),
            vec!["sounds/step.ogg", "textures/blocks/stone.png"]
        );
        assert_eq!(
            overlay.get("textures/blocks/stone.png").unwrap(),
            temp.path().join("textures/blocks/stone.png")
        );
        assert!(overlay.has("/sounds/step.ogg"));
        assert!(overlay.has("sounds\\step.ogg"));
    }

    #[test]
    fn test_equal_priority_later_id_wins() {
        let p1 = TempDir::new().unwrap();
        let p2 = TempDir::new().unwrap();
        let p0 = TempDir::new().unwrap();
        write(p1.path(), "x/y.png");
        write(p2.path(), "x/y.png");
        write(p0.path(), "x/y.png");

        let overlay = ResourceOverlay::new();
        overlay.inject(&owner("a", LoadPriority::Normal), p1.path()).unwrap();
        let stats = overlay.inject(&owner("b", LoadPriority::Normal), p2.path()).unwrap();
        assert_eq!(stats.overridden, 1);
        assert_eq!(overlay.get("x/y.png").unwrap(), p2.path().join("x/y.png"));

        let stats = overlay.inject(&owner("z", LoadPriority::Low), p0.path()).unwrap();
        assert_eq!(stats.shadowed, 1);
        assert_eq!(overlay.get("x/y.png").unwrap(), p2.path().join("x/y.png"));
        assert_eq!(overlay.owner_of("x/y.png").as_deref(), Some("b"));
    }

    #[test]
    fn test_order_independent() {
        let high = TempDir::new().unwrap();
        let normal = TempDir::new().unwrap();
        write(high.path(), "a.txt");
        write(normal.path(), "a.txt");

        let overlay = ResourceOverlay::new();
        overlay.inject(&owner("zz", LoadPriority::Normal), normal.path()).unwrap();
        overlay.inject(&owner("aa", LoadPriority::High), high.path()).unwrap();
        assert_eq!(overlay.owner_of("a.txt").as_deref(), Some("aa"));

        let overlay = ResourceOverlay::new();
        overlay.inject(&owner("aa", LoadPriority::High), high.path()).unwrap();
        overlay.inject(&owner("zz", LoadPriority::Normal), normal.path()).unwrap();
        assert_eq!(overlay.owner_of("a.txt").as_deref(), Some("aa"));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let overlay = ResourceOverlay::new();
        let stats = overlay
            .inject(&owner("a", LoadPriority::Normal), &temp.path().join("assets"))
            .unwrap();

        assert_eq!(stats.total(), 0);
        assert!(overlay.is_empty());
        assert!(overlay.get("anything").is_none());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.txt");

        let overlay = ResourceOverlay::new();
        overlay.inject(&owner("a", LoadPriority::Normal), temp.path()).unwrap();
        assert_eq!(overlay.len(), 1);

        overlay.clear();
        assert!(overlay.is_empty());
        assert!(!overlay.has("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_not_followed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "textures/stone.png");
        std::os::unix::fs::symlink(temp.path(), temp.path().join("textures/loop")).unwrap();

        let overlay = ResourceOverlay::new();
        let stats = overlay
            .inject(&owner("a", LoadPriority::Normal), temp.path())
            .unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(overlay.paths(), vec!["textures/stone.png"]);
    }
}
