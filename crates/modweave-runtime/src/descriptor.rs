//! Mod descriptor parsing.
//!
//! Each mod ships a `mod.toml` file that describes its metadata, the host
//! versions it supports, its dependencies, the permissions it asks for and
//! an optional free-form configuration table.
//!
//! ```toml
//! permissions = ["resource_inject", "block_register"]
//!
//! [mod]
//! id = "example:magic"
//! name = "Magic Blocks"
//! version = "1.2.0"
//! game_versions = ["1.0.0", "1.1.0"]
//! entry_point = "example.MagicBlocks"
//! load_priority = "high"
//!
//! [dependencies]
//! required = ["core:lib:1.0.0"]
//! optional = ["extra:sounds"]
//!
//! [config]
//! glow = true
//! ```

use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Host version assumed when a descriptor does not list any.
pub const DEFAULT_GAME_VERSION: &str = "1.0.0";

/// Immutable metadata record for one discovered mod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModDescriptor {
    /// Mod metadata.
    #[serde(rename = "mod")]
    pub meta: ModMetadata,

    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Declared permission identifiers.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Mod-specific configuration key-value pairs.
    #[serde(default)]
    pub config: BTreeMap<String, toml::Value>,

    /// Directory the mod was discovered in.
    #[serde(skip)]
    root: Option<PathBuf>,
}

/// Mod metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModMetadata {
    /// Unique identifier, `owner:name` by convention.
    pub id: String,

    /// Human-readable name. Defaults to the id.
    #[serde(default)]
    pub name: String,

    /// Version string.
    pub version: String,

    /// Host versions this mod supports. Accepts a single string or a list.
    #[serde(
        default = "default_game_versions",
        deserialize_with = "string_or_list"
    )]
    pub game_versions: Vec<String>,

    /// Entry point reference handed to the entry loader.
    pub entry_point: String,

    /// Ordering hint used to break ties.
    #[serde(default)]
    pub load_priority: LoadPriority,

    /// Mod description.
    #[serde(default)]
    pub description: Option<String>,

    /// Mod author(s).
    #[serde(default)]
    pub authors: Vec<String>,
}

fn default_game_versions() -> Vec<String> {
    vec![DEFAULT_GAME_VERSION.to_string()]
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(version) => vec![version],
        OneOrMany::Many(versions) => versions,
    })
}

/// Required and optional dependency specs (`depId[:constraint]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub optional: Vec<String>,
}

/// Load priority of a mod. Only used to break ordering ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoadPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl LoadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPriority::Low => "low",
            LoadPriority::Normal => "normal",
            LoadPriority::High => "high",
        }
    }
}

// Unknown priorities fall back to `Normal` rather than rejecting the mod.
impl From<String> for LoadPriority {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "low" => LoadPriority::Low,
            "high" => LoadPriority::High,
            _ => LoadPriority::Normal,
        }
    }
}

impl From<LoadPriority> for String {
    fn from(value: LoadPriority) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LoadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version requirement attached to a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// `*` or no constraint at all.
    Any,
    /// Exact string match.
    Exact(String),
}

impl VersionConstraint {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "*" => VersionConstraint::Any,
            exact => VersionConstraint::Exact(exact.to_string()),
        }
    }

    /// Check whether a concrete version satisfies this constraint.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(required) => required == version,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => f.write_str("*"),
            VersionConstraint::Exact(v) => f.write_str(v),
        }
    }
}

/// A parsed dependency spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub id: String,
    pub constraint: VersionConstraint,
}

impl DependencySpec {
    /// Parse `depId[:constraint]`.
    ///
    /// Ids are namespaced with `:` themselves, so the spec is only split at
    /// its last `:` when the remainder looks like a version constraint:
    /// `core:lib` is an id, `core:lib:1.0.0` and `base:*` carry constraints.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if let Some((id, constraint)) = spec.rsplit_once(':') {
            if !id.is_empty() && looks_like_constraint(constraint) {
                return Self {
                    id: id.to_string(),
                    constraint: VersionConstraint::parse(constraint),
                };
            }
        }

        Self {
            id: spec.to_string(),
            constraint: VersionConstraint::Any,
        }
    }

    /// Parse against a set of known ids.
    ///
    /// A spec that names a known id verbatim is that id with no constraint,
    /// so `core:3d` stays a dependency on `core:3d` even though its tail
    /// looks like a version.
    pub fn parse_known(spec: &str, is_known: impl Fn(&str) -> bool) -> Self {
        let trimmed = spec.trim();
        if is_known(trimmed) {
            return Self {
                id: trimmed.to_string(),
                constraint: VersionConstraint::Any,
            };
        }
        Self::parse(trimmed)
    }
}

fn looks_like_constraint(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some('*') => s.len() == 1,
        Some(c) if c.is_ascii_digit() => true,
        Some('=') | Some('v') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

impl ModDescriptor {
    /// Create a descriptor in memory. Mostly useful for hosts that register
    /// mods without a manifest file, and for tests.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            meta: ModMetadata {
                name: id.clone(),
                entry_point: id.clone(),
                id,
                version: version.into(),
                game_versions: default_game_versions(),
                load_priority: LoadPriority::Normal,
                description: None,
                authors: Vec::new(),
            },
            dependencies: Dependencies::default(),
            permissions: Vec::new(),
            config: BTreeMap::new(),
            root: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: LoadPriority) -> Self {
        self.meta.load_priority = priority;
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.meta.entry_point = entry_point.into();
        self
    }

    pub fn with_game_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.game_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required(mut self, spec: impl Into<String>) -> Self {
        self.dependencies.required.push(spec.into());
        self
    }

    pub fn with_optional(mut self, spec: impl Into<String>) -> Self {
        self.dependencies.optional.push(spec.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Attach the directory the mod lives in.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Load a descriptor from a TOML file. The file's parent directory
    /// becomes the mod root.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut descriptor: ModDescriptor = content.parse()?;
        descriptor.root = path.parent().map(Path::to_path_buf);
        Ok(descriptor)
    }

    fn validate(&self) -> RuntimeResult<()> {
        if self.meta.id.is_empty() {
            return Err(RuntimeError::InvalidDescriptor(
                "Mod ID cannot be empty".to_string(),
            ));
        }

        if self.meta.id.chars().any(char::is_whitespace) {
            return Err(RuntimeError::InvalidDescriptor(format!(
                "Mod ID '{}' cannot contain whitespace",
                self.meta.id
            )));
        }

        if self.meta.version.is_empty() {
            return Err(RuntimeError::InvalidDescriptor(format!(
                "Mod '{}' has an empty version",
                self.meta.id
            )));
        }

        if self.meta.entry_point.is_empty() {
            return Err(RuntimeError::InvalidDescriptor(format!(
                "Mod '{}' has an empty entry point",
                self.meta.id
            )));
        }

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn version(&self) -> &str {
        &self.meta.version
    }

    pub fn entry_point(&self) -> &str {
        &self.meta.entry_point
    }

    pub fn priority(&self) -> LoadPriority {
        self.meta.load_priority
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Check whether this mod supports the given host version.
    pub fn is_compatible_with(&self, game_version: &str) -> bool {
        self.meta.game_versions.iter().any(|v| v == game_version)
    }

    /// Parsed required dependencies.
    pub fn required_dependencies(&self) -> impl Iterator<Item = DependencySpec> + '_ {
        self.dependencies.required.iter().map(|s| DependencySpec::parse(s))
    }

    /// Parsed optional dependencies.
    pub fn optional_dependencies(&self) -> impl Iterator<Item = DependencySpec> + '_ {
        self.dependencies.optional.iter().map(|s| DependencySpec::parse(s))
    }

    /// Required dependencies parsed with [`DependencySpec::parse_known`].
    pub fn required_dependencies_known<'a>(
        &'a self,
        is_known: impl Fn(&str) -> bool + Copy + 'a,
    ) -> impl Iterator<Item = DependencySpec> + 'a {
        self.dependencies
            .required
            .iter()
            .map(move |s| DependencySpec::parse_known(s, is_known))
    }

    /// Optional dependencies parsed with [`DependencySpec::parse_known`].
    pub fn optional_dependencies_known<'a>(
        &'a self,
        is_known: impl Fn(&str) -> bool + Copy + 'a,
    ) -> impl Iterator<Item = DependencySpec> + 'a {
        self.dependencies
            .optional
            .iter()
            .map(move |s| DependencySpec::parse_known(s, is_known))
    }
}

impl FromStr for ModDescriptor {
    type Err = RuntimeError;

    fn from_str(content: &str) -> RuntimeResult<Self> {
        let mut descriptor: ModDescriptor = toml::from_str(content)?;
        if descriptor.meta.name.is_empty() {
            descriptor.meta.name = descriptor.meta.id.clone();
        }
        descriptor.validate()?;
        Ok(descriptor)
    }
}
