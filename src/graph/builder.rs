use crate::graph::DependentSpecifier;
use crate::normalize::PackageRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Index of a node within its [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// One package version. Unique within a graph by name, version, and ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    pub id: NodeId,
    pub name: String,
    pub version: String,
    pub ecosystem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

/// A parent package depending on an exact child version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub parent: NodeId,
    pub child: NodeId,
}

/// A dependency that could not be pinned to a node: a version range, or an exact version missing from the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnresolvedEdge {
    pub parent: NodeId,
    pub specifier: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub unresolved_edge_count: usize,
    pub cycle_count: usize,
    pub has_root: bool,
    pub root_out_degree: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub root: Option<NodeId>,
    pub nodes: Vec<PackageNode>,
    pub links: Vec<Link>,
    pub unresolved: Vec<UnresolvedEdge>,
    pub stats: GraphStats,
}

impl DependencyGraph {
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&PackageNode> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn find(&self, name: &str, version: &str) -> Option<&PackageNode> {
        self.nodes.iter().find(|n| n.name == name && n.version == version)
    }
}

/// Turns package records of one ecosystem into a [`DependencyGraph`].
#[derive(Debug, Clone)]
pub struct DependencyGraphBuilder {
    ecosystem: String,
}

impl DependencyGraphBuilder {
    #[must_use]
    pub fn new(ecosystem: impl Into<String>) -> Self {
        Self {
            ecosystem: ecosystem.into(),
        }
    }

    /// Builds the graph.
    ///
    /// Nodes are deduplicated by name and version, keeping the first record seen. A
    /// `name@version` specifier whose version text matches a node exactly becomes a link,
    /// whether or not it is strict semver; everything else is kept as an unresolved edge.
    /// Input containing cycles is fine.
    #[must_use]
    pub fn build(&self, packages: &[PackageRecord], root: Option<&PackageRecord>) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        let mut index = NodeIndex::default();

        let records = || packages.iter().chain(root);

        for record in records() {
            let id = NodeId(graph.nodes.len());
            if !index.insert(&record.name, &record.version, id) {
                continue;
            }

            graph.nodes.push(PackageNode {
                id,
                name: record.name.clone(),
                version: record.version.clone(),
                ecosystem: self.ecosystem.clone(),
                resolved: record.resolved.clone(),
            });
        }

        graph.root = root.and_then(|r| index.get(&r.name, &r.version));

        let mut seen_links = HashSet::new();
        let mut seen_unresolved = HashSet::new();

        for record in records() {
            let Some(parent) = index.get(&record.name, &record.version) else {
                continue;
            };

            for specifier in &record.dependencies {
                let child = match DependentSpecifier::parse(specifier) {
                    DependentSpecifier::Resolved { name, version } => index.get(&name, &version.to_string()),
                    DependentSpecifier::Range { name: Some(name), range } => index.get(&name, &range),
                    DependentSpecifier::Range { name: None, .. } => None,
                };

                if let Some(child) = child {
                    if seen_links.insert((parent, child)) {
                        graph.links.push(Link { parent, child });
                    }
                } else if seen_unresolved.insert((parent, specifier.as_str())) {
                    graph.unresolved.push(UnresolvedEdge {
                        parent,
                        specifier: specifier.clone(),
                    });
                }
            }
        }

        graph.stats = GraphStats {
            node_count: graph.nodes.len(),
            edge_count: graph.links.len(),
            unresolved_edge_count: graph.unresolved.len(),
            cycle_count: count_cycles(graph.nodes.len(), &graph.links),
            has_root: graph.root.is_some(),
            root_out_degree: graph.root.map(|root| graph.links.iter().filter(|l| l.parent == root).count()),
        };

        graph
    }
}

/// Node ids keyed by name, then version.
#[derive(Default)]
struct NodeIndex<'a> {
    by_name: HashMap<&'a str, HashMap<&'a str, NodeId>>,
}

impl<'a> NodeIndex<'a> {
    fn get(&self, name: &str, version: &str) -> Option<NodeId> {
        self.by_name.get(name)?.get(version).copied()
    }

    /// Returns `false` when the name and version are already present.
    fn insert(&mut self, name: &'a str, version: &'a str, id: NodeId) -> bool {
        let versions = self.by_name.entry(name).or_default();
        if versions.contains_key(version) {
            return false;
        }

        let _ = versions.insert(version, id);
        true
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Counts back edges found by an iterative depth-first search over every node.
fn count_cycles(node_count: usize, links: &[Link]) -> usize {
    let mut adjacency = vec![Vec::new(); node_count];
    for link in links {
        if let Some(children) = adjacency.get_mut(link.parent.0) {
            children.push(link.child.0);
        }
    }

    let mut state = vec![Visit::New; node_count];
    let mut cycles = 0;

    for start in 0..node_count {
        if state[start] != Visit::New {
            continue;
        }

        state[start] = Visit::Active;
        let mut stack = vec![(start, 0_usize)];

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if let Some(&child) = adjacency[node].get(next) {
                top.1 += 1;
                match state[child] {
                    Visit::New => {
                        state[child] = Visit::Active;
                        stack.push((child, 0));
                    }
                    Visit::Active => cycles += 1,
                    Visit::Done => {}
                }
            } else {
                state[node] = Visit::Done;
                let _ = stack.pop();
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, dependencies: &[&str]) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            resolved: None,
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_ranges_only_produce_no_links() {
        let packages = [
            record("a", "1.0.0", &["b@^2.0.0"]),
            record("b", "2.1.0", &["c@~3.0.0"]),
            record("c", "3.0.1", &[]),
            record("a", "1.0.0", &["b@^2.0.0"]),
        ];

        let graph = DependencyGraphBuilder::new("npm").build(&packages, None);

        assert_eq!(graph.stats.node_count, 3);
        assert_eq!(graph.stats.edge_count, 0);
        assert_eq!(graph.stats.unresolved_edge_count, 2);
        assert!(!graph.stats.has_root);
        assert_eq!(graph.stats.root_out_degree, None);
    }

    #[test]
    fn test_exact_versions_link_and_dedup() {
        let packages = [
            record("a", "1.0.0", &["b@2.0.0", "b@2.0.0", "c@3.0.0"]),
            record("b", "2.0.0", &["c@3.0.0"]),
            record("c", "3.0.0", &[]),
        ];
        let root = record("app", "0.1.0", &["a@1.0.0", "missing@9.9.9"]);

        let graph = DependencyGraphBuilder::new("npm").build(&packages, Some(&root));

        assert_eq!(graph.stats.node_count, 4);
        assert_eq!(graph.stats.edge_count, 4);
        assert_eq!(graph.stats.unresolved_edge_count, 1);
        assert_eq!(graph.stats.cycle_count, 0);
        assert!(graph.stats.has_root);
        assert_eq!(graph.stats.root_out_degree, Some(1));
        assert_eq!(graph.node(graph.root.unwrap()).unwrap().name, "app");
        assert_eq!(graph.unresolved[0].specifier, "missing@9.9.9");

        for link in &graph.links {
            assert!(graph.node(link.parent).is_some());
            assert!(graph.node(link.child).is_some());
        }
    }

    #[test]
    fn test_non_semver_versions_link_on_exact_match() {
        let packages = [record("a", "1.0.0", &["b@1.0", "c@1.0"]), record("b", "1.0", &[])];

        let graph = DependencyGraphBuilder::new("npm").build(&packages, None);

        assert_eq!(graph.stats.edge_count, 1);
        assert_eq!(graph.stats.unresolved_edge_count, 1);
        assert_eq!(graph.unresolved[0].specifier, "c@1.0");
    }

    #[test]
    fn test_cycles_terminate_and_are_counted() {
        let packages = [
            record("a", "1.0.0", &["b@1.0.0"]),
            record("b", "1.0.0", &["c@1.0.0"]),
            record("c", "1.0.0", &["a@1.0.0", "c@1.0.0"]),
        ];

        let graph = DependencyGraphBuilder::new("npm").build(&packages, None);

        assert_eq!(graph.stats.edge_count, 4);
        assert_eq!(graph.stats.cycle_count, 2);
    }

    #[test]
    fn test_root_already_in_packages_is_not_duplicated() {
        let root = record("app", "1.0.0", &["a@1.0.0"]);
        let packages = [record("a", "1.0.0", &[]), root.clone()];

        let graph = DependencyGraphBuilder::new("npm").build(&packages, Some(&root));

        assert_eq!(graph.stats.node_count, 2);
        assert_eq!(graph.stats.edge_count, 1);
        assert_eq!(graph.find("app", "1.0.0").unwrap().id, graph.root.unwrap());
    }

    #[test]
    fn test_empty_input() {
        let graph = DependencyGraphBuilder::new("yarn").build(&[], None);
        assert_eq!(graph.stats, GraphStats::default());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let packages: Vec<_> = (0..20_000)
            .map(|i| PackageRecord {
                name: format!("p{i}"),
                version: "1.0.0".to_string(),
                resolved: None,
                dependencies: vec![format!("p{}@1.0.0", i + 1)],
            })
            .collect();

        let graph = DependencyGraphBuilder::new("npm").build(&packages, None);
        assert_eq!(graph.stats.edge_count, 19_999);
        assert_eq!(graph.stats.cycle_count, 0);
    }
}
