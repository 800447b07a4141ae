//! Dependency graph container and ordering algorithms
//!
//! The graph owns every node in an arena; the first node added is the root.
//! Orderings are always derived by levelling: level 0 of [`DepsGraph::by_levels`]
//! holds the nodes without dependencies, level 0 of
//! [`DepsGraph::inverse_levels`] the nodes nobody depends on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::warn;

use crate::dependency::node::{BinaryStatus, Edge, EdgeKind, Node, NodeId};
use crate::reference::{BinaryReference, PackageReference};

/// Target list entry that selects every node
pub const ALL: &str = "ALL";

/// Dependency graph owning its nodes and edges
#[derive(Debug, Clone, Default)]
pub struct DepsGraph {
    nodes: Vec<Node>,

    /// Alias redirections followed during resolution: alias -> target
    pub(crate) aliased: BTreeMap<String, PackageReference>,

    /// Nodes sharing one binary reference, first evaluated node first
    pub(crate) evaluated: HashMap<BinaryReference, Vec<NodeId>>,

    /// Requirements dropped because their recipe could not be found
    pub(crate) unresolved: Vec<String>,
}

impl DepsGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; the first node becomes the root
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Connect two member nodes
    ///
    /// # Panics
    ///
    /// Panics when an endpoint does not belong to this graph.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, kind: EdgeKind) {
        assert!(
            src.0 < self.nodes.len() && dst.0 < self.nodes.len(),
            "edge endpoints must belong to the graph"
        );
        let edge = Edge { src, dst, kind };
        self.nodes[src.0].add_edge(edge);
        self.nodes[dst.0].add_edge(edge);
    }

    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// All nodes in creation order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every edge once, grouped by source node
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.nodes.iter().flat_map(|n| n.dependencies.iter())
    }

    /// Nodes carrying the given package name
    pub fn find_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.name() == Some(name))
    }

    pub fn aliased(&self) -> &BTreeMap<String, PackageReference> {
        &self.aliased
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Make `other` visible in the public closure and scope of `node`
    pub fn connect_closure(&mut self, node: NodeId, other: NodeId) {
        if node == other {
            return;
        }
        let Some(name) = self.nodes[other.0].name().map(str::to_string) else {
            return;
        };
        let target = &mut self.nodes[node.0];
        target.public_closure.insert(name.clone(), other);
        target.public_deps.insert(name, other);
        self.nodes[other.0].inverse_closure.insert(node);
    }

    /// Clear the private flag of `id` and of everything it reaches through
    /// non-private edges
    pub fn make_public(&mut self, id: NodeId) {
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let node = &mut self.nodes[current.0];
            node.private = false;
            pending.extend(
                node.dependencies
                    .iter()
                    .filter(|e| !e.private())
                    .map(|e| e.dst),
            );
        }
    }

    /// Levels from the leaves up: dependencies always sit in an earlier level
    pub fn by_levels(&self) -> Vec<Vec<NodeId>> {
        self.order_levels(None, true)
    }

    /// Levels from the root down: dependants always sit in an earlier level
    pub fn inverse_levels(&self) -> Vec<Vec<NodeId>> {
        self.order_levels(None, false)
    }

    /// Leaf-first levels restricted to a subset; edges leaving it are ignored
    pub fn levels_of(&self, subset: &BTreeSet<NodeId>) -> Vec<Vec<NodeId>> {
        self.order_levels(Some(subset), true)
    }

    /// Nodes in leaf-first order, flattened
    pub fn ordered_iterate(&self) -> Vec<NodeId> {
        self.by_levels().into_iter().flatten().collect()
    }

    fn order_levels(&self, subset: Option<&BTreeSet<NodeId>>, direct: bool) -> Vec<Vec<NodeId>> {
        let mut opened: BTreeSet<NodeId> = match subset {
            Some(subset) => subset.clone(),
            None => self.nodes.iter().map(|n| n.id).collect(),
        };

        let mut result = Vec::new();
        while !opened.is_empty() {
            let mut level: Vec<NodeId> = opened
                .iter()
                .copied()
                .filter(|id| {
                    let node = &self.nodes[id.0];
                    if direct {
                        !node.dependencies.iter().any(|e| opened.contains(&e.dst))
                    } else {
                        !node.dependants.iter().any(|e| opened.contains(&e.src))
                    }
                })
                .collect();

            if level.is_empty() {
                // Only reachable on a cyclic graph, which resolution never builds
                warn!(
                    "Dependency cycle among {} nodes, ordering them in a single level",
                    opened.len()
                );
                level = opened.iter().copied().collect();
            }

            for id in &level {
                opened.remove(id);
            }
            level.sort_by(|a, b| self.nodes[a.0].order(&self.nodes[b.0]));
            result.push(level);
        }
        result
    }

    /// Deduplication key of a node once its package id is known
    fn identity(node: &Node) -> Option<(PackageReference, String)> {
        match (node.reference(), node.package_id()) {
            (Some(reference), Some(package_id)) => {
                Some((reference.clone(), package_id.to_string()))
            }
            _ => None,
        }
    }

    /// New graph in which nodes sharing reference and package id are merged.
    ///
    /// The root is always kept; other consumer and virtual nodes are dropped
    /// with their edges. Nodes without a package id stay distinct.
    pub fn collapse_graph(&self) -> DepsGraph {
        let mut result = DepsGraph::new();
        result.aliased = self.aliased.clone();
        result.unresolved = self.unresolved.clone();
        let Some(root) = self.root_node() else {
            return result;
        };

        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let mut unique: HashMap<(PackageReference, String), NodeId> = HashMap::new();

        let new_root = result.add_node(root.partial_copy());
        mapping.insert(root.id, new_root);
        if let Some(key) = Self::identity(root) {
            unique.insert(key, new_root);
        }

        for node in self.nodes.iter().skip(1) {
            if node.is_pseudo() {
                continue;
            }
            let target = match Self::identity(node) {
                Some(key) => match unique.get(&key) {
                    Some(&existing) => existing,
                    None => {
                        let id = result.add_node(node.partial_copy());
                        unique.insert(key, id);
                        id
                    }
                },
                None => result.add_node(node.partial_copy()),
            };
            mapping.insert(node.id, target);
        }

        for node in &self.nodes {
            let Some(&src) = mapping.get(&node.id) else {
                continue;
            };
            for edge in &node.dependencies {
                if let Some(&dst) = mapping.get(&edge.dst) {
                    if src != dst {
                        result.add_edge(src, dst, edge.kind);
                    }
                }
            }
        }
        result
    }

    fn matches_target(node: &Node, targets: &[String]) -> bool {
        if targets.iter().any(|t| t == ALL) {
            return true;
        }
        let Some(reference) = node.reference() else {
            return false;
        };
        let full = reference.to_string();
        let cleared = reference.cleared().to_string();
        targets
            .iter()
            .any(|t| *t == full || *t == cleared || t == reference.name())
    }

    /// The matching nodes plus everything that transitively depends on them
    pub fn inverse_closure(&self, targets: &[String]) -> BTreeSet<NodeId> {
        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .iter()
            .filter(|n| Self::matches_target(n, targets))
            .map(|n| n.id)
            .collect();

        while let Some(id) = queue.pop_front() {
            if !closure.insert(id) {
                continue;
            }
            for dependant in self.nodes[id.0].inverse_neighbors() {
                if !closure.contains(&dependant) {
                    queue.push_back(dependant);
                }
            }
        }
        closure
    }

    /// Leaf-first batches of the nodes to build, each binary reference once
    pub fn new_build_order(&self) -> Vec<Vec<(NodeId, BinaryReference)>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for level in self.inverse_levels().into_iter().rev() {
            let mut batch = Vec::new();
            for id in level {
                let node = &self.nodes[id.0];
                if node.binary != Some(BinaryStatus::Build) {
                    continue;
                }
                let Ok(pref) = node.pref() else {
                    continue;
                };
                // Recipe revisions stay distinct, binary revisions do not
                let pref = pref.cleared();
                if seen.insert(pref.clone()) {
                    batch.push((id, pref));
                }
            }
            if !batch.is_empty() {
                result.push(batch);
            }
        }
        result
    }

    /// Leaf-first reference batches of the targets and their dependants
    pub fn build_order(&self, targets: &[String]) -> Vec<Vec<PackageReference>> {
        let collapsed = self.collapse_graph();
        let closure = collapsed.inverse_closure(targets);
        collapsed
            .inverse_levels()
            .into_iter()
            .rev()
            .filter_map(|level| {
                let batch: Vec<PackageReference> = level
                    .into_iter()
                    .filter(|id| closure.contains(id))
                    .map(|id| collapsed.node(id))
                    .filter(|n| !n.is_pseudo())
                    .filter_map(|n| n.reference().cloned())
                    .collect();
                (!batch.is_empty()).then_some(batch)
            })
            .collect()
    }

    /// Level-ordered references of the nodes to build, without revisions
    pub fn nodes_to_build(&self) -> Vec<PackageReference> {
        let mut result: Vec<PackageReference> = Vec::new();
        for id in self.ordered_iterate() {
            let node = &self.nodes[id.0];
            if node.binary != Some(BinaryStatus::Build) {
                continue;
            }
            if let Some(reference) = node.reference() {
                let cleared = reference.cleared();
                if !result.contains(&cleared) {
                    result.push(cleared);
                }
            }
        }
        result
    }

    /// Get the dependency tree as a string for display
    pub fn format_tree(&self) -> String {
        let mut output = String::new();
        let mut visited = HashSet::new();
        if let Some(root) = self.root() {
            self.format_node(root, &mut output, &mut visited, 0, true);
        }
        output
    }

    /// Format a single node and its children
    fn format_node(
        &self,
        id: NodeId,
        output: &mut String,
        visited: &mut HashSet<NodeId>,
        depth: usize,
        is_last: bool,
    ) {
        let node = &self.nodes[id.0];
        let prefix = if depth == 0 {
            String::new()
        } else {
            "  ".repeat(depth - 1) + if is_last { "└── " } else { "├── " }
        };

        let already_visited = visited.contains(&id);
        let marker = if already_visited {
            " (already resolved)"
        } else {
            ""
        };

        let mut flags = Vec::new();
        if node.is_build_require() {
            flags.push("build");
        }
        if node.is_private() {
            flags.push("private");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        let binary = node
            .binary()
            .map(|b| format!(" ({})", b))
            .unwrap_or_default();

        output.push_str(&format!(
            "{}{}{}{}{}\n",
            prefix,
            node.display_name(),
            flags,
            binary,
            marker
        ));

        if already_visited {
            return;
        }
        visited.insert(id);

        let count = node.dependencies.len();
        for (i, edge) in node.dependencies.iter().enumerate() {
            self.format_node(edge.dst, output, visited, depth + 1, i == count - 1);
        }
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges().count(),
            build_require_count: self.nodes.iter().filter(|n| n.is_build_require()).count(),
            private_count: self.nodes.iter().filter(|n| n.is_private()).count(),
            depth: self.by_levels().len(),
        }
    }
}

/// Statistics about a dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,

    /// Nodes only needed to build others
    pub build_require_count: usize,

    /// Nodes only reachable through private requirements
    pub private_count: usize,

    /// Number of levels
    pub depth: usize,
}
