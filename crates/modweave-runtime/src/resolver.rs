//! Dependency resolution and load ordering.
//!
//! Resolution runs in three passes over the discovered set:
//!
//! 1. every required dependency must be present with a matching version;
//! 2. a dependency graph is built over the mods that are present;
//! 3. the graph is ordered so dependencies come first. Ties between mods
//!    that are ready at the same time go to the higher load priority, then
//!    to the lexicographically smaller id, so the order is fully
//!    deterministic.
//!
//! A cycle fails the whole resolution; no partial order is produced.

use crate::descriptor::{LoadPriority, ModDescriptor};
use crate::error::{RuntimeError, RuntimeResult};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Mapping from mod id to the ids it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Ids the given mod depends on.
    pub fn dependencies_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(id)
    }

    /// Ids that depend on the given mod.
    pub fn dependents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, deps)| deps.contains(id))
            .map(|(dependent, _)| dependent.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }
}

/// Resolves the load order of a set of mods.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    order_optional: bool,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self {
            order_optional: true,
        }
    }

    /// Whether optional dependencies that are present also constrain the
    /// order. On by default; turning it off leaves only required edges.
    ///
    /// With ordering on, a required edge one way and an optional edge back
    /// is a cycle.
    pub fn with_optional_ordering(mut self, enabled: bool) -> Self {
        self.order_optional = enabled;
        self
    }

    /// Validate the set and return it in load order.
    pub fn resolve<'a>(
        &self,
        mods: &'a BTreeMap<String, ModDescriptor>,
    ) -> RuntimeResult<Vec<&'a ModDescriptor>> {
        Self::validate(mods)?;
        let graph = self.build_graph(mods);
        let order = Self::topological_sort(mods, &graph)?;

        debug!(
            "Resolved {} mods ({} dependency edges)",
            order.len(),
            graph.edge_count()
        );
        Ok(order)
    }

    fn validate(mods: &BTreeMap<String, ModDescriptor>) -> RuntimeResult<()> {
        let known = |id: &str| mods.contains_key(id);
        for descriptor in mods.values() {
            for dep in descriptor.required_dependencies_known(known) {
                let Some(found) = mods.get(&dep.id) else {
                    return Err(RuntimeError::MissingDependency {
                        module: descriptor.id().to_string(),
                        dependency: dep.id,
                    });
                };

                if !dep.constraint.matches(found.version()) {
                    return Err(RuntimeError::VersionMismatch {
                        module: descriptor.id().to_string(),
                        dependency: dep.id,
                        required: dep.constraint.to_string(),
                        found: found.version().to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Build the dependency graph. Edges only point at mods in the set.
    pub fn build_graph(&self, mods: &BTreeMap<String, ModDescriptor>) -> DependencyGraph {
        let mut edges: BTreeMap<String, BTreeSet<String>> = mods
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();

        let known = |id: &str| mods.contains_key(id);
        for descriptor in mods.values() {
            let optional = self
                .order_optional
                .then(|| descriptor.optional_dependencies_known(known))
                .into_iter()
                .flatten();

            for dep in descriptor.required_dependencies_known(known).chain(optional) {
                // A self-dependency stays in the graph as a cycle of length one.
                if mods.contains_key(&dep.id) {
                    if let Some(deps) = edges.get_mut(descriptor.id()) {
                        deps.insert(dep.id);
                    }
                }
            }
        }

        DependencyGraph { edges }
    }

    fn topological_sort<'a>(
        mods: &'a BTreeMap<String, ModDescriptor>,
        graph: &DependencyGraph,
    ) -> RuntimeResult<Vec<&'a ModDescriptor>> {
        // Number of not-yet-emitted dependencies per mod.
        let mut pending: BTreeMap<&str, usize> = graph
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (id, deps) in &graph.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        type ReadyKey<'k> = (Reverse<LoadPriority>, &'k str);
        let key = |id: &'a str| -> ReadyKey<'a> { (Reverse(mods[id].priority()), id) };

        let mut ready: BTreeSet<ReadyKey<'a>> = mods
            .keys()
            .map(String::as_str)
            .filter(|id| pending.get(*id) == Some(&0))
            .map(key)
            .collect();

        let mut order = Vec::with_capacity(mods.len());
        while let Some((_, id)) = ready.pop_first() {
            order.push(&mods[id]);

            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        if let Some((dependent, _)) = mods.get_key_value(dependent) {
                            ready.insert(key(dependent.as_str()));
                        }
                    }
                }
            }
        }

        if order.len() < mods.len() {
            let involved = pending
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(RuntimeError::CyclicDependency { involved });
        }

        Ok(order)
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(mods: Vec<ModDescriptor>) -> BTreeMap<String, ModDescriptor> {
        mods.into_iter().map(|m| (m.id().to_string(), m)).collect()
    }

    fn ids(order: &[&ModDescriptor]) -> Vec<String> {
        order.iter().map(|m| m.id().to_string()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let mods = set(vec![
            ModDescriptor::new("c", "1.0").with_required("b"),
            ModDescriptor::new("b", "1.0").with_required("a"),
            ModDescriptor::new("a", "1.0"),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_priority_then_id_tie_break() {
        let mods = set(vec![
            ModDescriptor::new("c", "1.0"),
            ModDescriptor::new("b", "1.0"),
            ModDescriptor::new("a", "1.0").with_priority(LoadPriority::High),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);

        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_priority(LoadPriority::Low),
            ModDescriptor::new("b", "1.0"),
            ModDescriptor::new("z", "1.0").with_priority(LoadPriority::High),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["z", "b", "a"]);
    }

    #[test]
    fn test_priority_never_overrides_dependencies() {
        let mods = set(vec![
            ModDescriptor::new("lib", "1.0").with_priority(LoadPriority::Low),
            ModDescriptor::new("app", "1.0")
                .with_priority(LoadPriority::High)
                .with_required("lib"),
            ModDescriptor::new("other", "1.0"),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["other", "lib", "app"]);
    }

    #[test]
    fn test_missing_dependency() {
        let mods = set(vec![ModDescriptor::new("a", "1.0").with_required("ghost:lib")]);

        let err = DependencyResolver::new().resolve(&mods).unwrap_err();
        match err {
            RuntimeError::MissingDependency { module, dependency } => {
                assert_eq!(module, "a");
                assert_eq!(dependency, "ghost:lib");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_required("b:2.0"),
            ModDescriptor::new("b", "1.0"),
        ]);

        let err = DependencyResolver::new().resolve(&mods).unwrap_err();
        assert!(matches!(err, RuntimeError::VersionMismatch { ref found, .. } if found == "1.0"));
    }

    #[test]
    fn test_wildcard_and_exact_versions() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0")
                .with_required("b:*")
                .with_required("c:3.1.4"),
            ModDescriptor::new("b", "9.9"),
            ModDescriptor::new("c", "3.1.4"),
        ]);

        assert!(DependencyResolver::new().resolve(&mods).is_ok());
    }

    #[test]
    fn test_optional_dependency_never_fails() {
        let mods = set(vec![ModDescriptor::new("a", "1.0").with_optional("missing:5.0")]);
        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["a"]);
    }

    #[test]
    fn test_optional_dependency_ordering() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_optional("b"),
            ModDescriptor::new("b", "1.0"),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["b", "a"]);

        let order = DependencyResolver::new()
            .with_optional_ordering(false)
            .resolve(&mods)
            .unwrap();
        assert_eq!(ids(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_optional_edge_can_close_a_cycle() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_required("b"),
            ModDescriptor::new("b", "1.0").with_optional("a"),
        ]);

        let err = DependencyResolver::new().resolve(&mods).unwrap_err();
        match err {
            RuntimeError::CyclicDependency { involved } => {
                assert_eq!(involved, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let order = DependencyResolver::new()
            .with_optional_ordering(false)
            .resolve(&mods)
            .unwrap();
        assert_eq!(ids(&order), vec!["b", "a"]);
    }

    #[test]
    fn test_dependency_on_id_with_numeric_tail() {
        let mods = set(vec![
            ModDescriptor::new("app", "1.0").with_required("core:3d"),
            ModDescriptor::new("core:3d", "2.0"),
        ]);

        let order = DependencyResolver::new().resolve(&mods).unwrap();
        assert_eq!(ids(&order), vec!["core:3d", "app"]);

        let mods = set(vec![
            ModDescriptor::new("app", "1.0").with_required("core:3d:2.0"),
            ModDescriptor::new("core:3d", "2.0"),
        ]);
        assert!(DependencyResolver::new().resolve(&mods).is_ok());
    }

    #[test]
    fn test_cycle_detected() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_required("b"),
            ModDescriptor::new("b", "1.0").with_required("a"),
            ModDescriptor::new("c", "1.0"),
        ]);

        let err = DependencyResolver::new().resolve(&mods).unwrap_err();
        match err {
            RuntimeError::CyclicDependency { involved } => {
                assert_eq!(involved, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mods = set(vec![ModDescriptor::new("a", "1.0").with_required("a")]);
        let err = DependencyResolver::new().resolve(&mods).unwrap_err();
        assert!(matches!(err, RuntimeError::CyclicDependency { .. }));
    }

    #[test]
    fn test_graph_edges() {
        let mods = set(vec![
            ModDescriptor::new("a", "1.0").with_required("b").with_optional("c"),
            ModDescriptor::new("b", "1.0"),
            ModDescriptor::new("c", "1.0"),
        ]);

        let graph = DependencyResolver::new().build_graph(&mods);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.dependencies_of("a").unwrap().contains("b"));
        assert_eq!(graph.dependents_of("b").collect::<Vec<_>>(), vec!["a"]);

        let graph = DependencyResolver::new()
            .with_optional_ordering(false)
            .build_graph(&mods);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_empty_set() {
        let mods = BTreeMap::new();
        assert!(DependencyResolver::new().resolve(&mods).unwrap().is_empty());
    }
}
