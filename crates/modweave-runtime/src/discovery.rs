//! Mod discovery.
//!
//! Mods are directories containing a `mod.toml` descriptor:
//!
//! ```text
//! mods/
//! ├── magic-blocks/
//! │   ├── mod.toml
//! │   └── assets/
//! │       └── textures/magic.png
//! └── core-lib/
//!     └── mod.toml
//! ```
//!
//! The default mods directory is `$XDG_DATA_HOME/modweave/mods/`.

use crate::descriptor::ModDescriptor;
use crate::error::RuntimeResult;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the descriptor file inside a mod directory.
pub const DESCRIPTOR_FILE: &str = "mod.toml";

/// Produces the set of mods available to the loader.
///
/// Implementations must be deterministic per call and may return an empty
/// map.
pub trait ModSource: Send + Sync {
    fn scan(&self) -> RuntimeResult<BTreeMap<String, ModDescriptor>>;
}

/// Get the user mods directory.
pub fn default_mods_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "modweave", "modweave")
        .map(|dirs| dirs.data_dir().join("mods"))
}

/// Check that a directory looks like a mod.
pub fn validate_mod_structure(dir: &Path) -> bool {
    dir.join(DESCRIPTOR_FILE).is_file()
}

/// Scans one directory for mods.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ModSource for DirectorySource {
    fn scan(&self) -> RuntimeResult<BTreeMap<String, ModDescriptor>> {
        let mut mods = BTreeMap::new();
        discover_in_directory(&self.dir, &mut mods)?;
        info!("Discovered {} mods in {:?}", mods.len(), self.dir);
        Ok(mods)
    }
}

/// A fixed set of descriptors, for hosts that build mods in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    mods: BTreeMap<String, ModDescriptor>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: ModDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Add a descriptor. A descriptor with an id already present is ignored.
    pub fn insert(&mut self, descriptor: ModDescriptor) {
        if self.mods.contains_key(descriptor.id()) {
            warn!("Duplicate mod id '{}', skipping", descriptor.id());
            return;
        }
        self.mods.insert(descriptor.id().to_string(), descriptor);
    }
}

impl FromIterator<ModDescriptor> for StaticSource {
    fn from_iter<T: IntoIterator<Item = ModDescriptor>>(iter: T) -> Self {
        let mut source = Self::new();
        for descriptor in iter {
            source.insert(descriptor);
        }
        source
    }
}

impl ModSource for StaticSource {
    fn scan(&self) -> RuntimeResult<BTreeMap<String, ModDescriptor>> {
        Ok(self.mods.clone())
    }
}

/// Discover mods in a specific directory.
///
/// Sub-directories are visited in name order; the first one claiming an id
/// wins and later duplicates are skipped. Unreadable descriptors are logged
/// and skipped.
pub fn discover_in_directory(
    dir: &Path,
    mods: &mut BTreeMap<String, ModDescriptor>,
) -> RuntimeResult<()> {
    if !dir.exists() {
        debug!("Mods directory {:?} does not exist", dir);
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(e) => {
            warn!("Failed to read mods directory {:?}: {}", dir, e);
            return Ok(());
        }
    };
    entries.sort();

    for path in entries {
        if !path.is_dir() {
            continue;
        }

        if !validate_mod_structure(&path) {
            debug!("Skipping {:?}: no {}", path, DESCRIPTOR_FILE);
            continue;
        }

        match discover_mod(&path) {
            Ok(descriptor) => {
                if mods.contains_key(descriptor.id()) {
                    warn!(
                        "Duplicate mod id '{}' in {:?}, skipping",
                        descriptor.id(),
                        path
                    );
                    continue;
                }

                info!(
                    "Discovered mod: {} ({} v{})",
                    descriptor.name(),
                    descriptor.id(),
                    descriptor.version()
                );
                mods.insert(descriptor.id().to_string(), descriptor);
            }
            Err(e) => {
                warn!("Failed to load descriptor from {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

/// Discover a single mod from its directory.
pub fn discover_mod(path: &Path) -> RuntimeResult<ModDescriptor> {
    ModDescriptor::from_file(&path.join(DESCRIPTOR_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_mod(dir: &Path, folder: &str, id: &str) {
        let mod_dir = dir.join(folder);
        std::fs::create_dir_all(&mod_dir).unwrap();

        let descriptor = format!(
            r#"
permissions = ["event_listen"]

[mod]
id = "{id}"
name = "Test Mod {id}"
version = "0.1.0"
entry_point = "test.Entry"
"#
        );

        let mut file = std::fs::File::create(mod_dir.join(DESCRIPTOR_FILE)).unwrap();
        file.write_all(descriptor.as_bytes()).unwrap();
    }

    #[test]
    fn test_discover_in_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_mod(temp_dir.path(), "mod-a", "test:a");
        create_test_mod(temp_dir.path(), "mod-b", "test:b");
        std::fs::create_dir_all(temp_dir.path().join("not-a-mod")).unwrap();

        let mods = DirectorySource::new(temp_dir.path()).scan().unwrap();

        assert_eq!(mods.len(), 2);
        assert!(mods.contains_key("test:a"));
        assert_eq!(
            mods["test:b"].root().unwrap(),
            temp_dir.path().join("mod-b")
        );
    }

    #[test]
    fn test_duplicate_id_first_wins() {
        let temp_dir = TempDir::new().unwrap();
        create_test_mod(temp_dir.path(), "a-first", "same:id");
        create_test_mod(temp_dir.path(), "b-second", "same:id");

        let mods = DirectorySource::new(temp_dir.path()).scan().unwrap();

        assert_eq!(mods.len(), 1);
        assert!(mods["same:id"].root().unwrap().ends_with("a-first"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mods = DirectorySource::new(temp_dir.path().join("nope")).scan().unwrap();
        assert!(mods.is_empty());
    }

    #[test]
    fn test_static_source_skips_duplicates() {
        let source: StaticSource = vec![
            ModDescriptor::new("a", "1.0"),
            ModDescriptor::new("a", "2.0"),
        ]
        .into_iter()
        .collect();

        let mods = source.scan().unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods["a"].version(), "1.0");
    }
}
