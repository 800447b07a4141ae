//! Graph vertices and edges
//!
//! Nodes live in the arena owned by [`DepsGraph`](super::graph::DepsGraph);
//! a [`NodeId`] is the index of the node in that arena. Edges are small
//! copyable index pairs stored on both endpoints.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::dependency::recipe::Recipe;
use crate::error::{GraphError, Result};
use crate::reference::{BinaryReference, PackageReference};

/// Index of a node inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the recipe of a node came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecipeStatus {
    Downloaded,
    Cache,
    Updated,
    Editable,
    /// The user's own recipe, root of the graph
    Consumer,
    /// An in-memory recipe created to hold the requested references
    Virtual,
}

impl RecipeStatus {
    /// Consumer and virtual nodes are pseudo-nodes without binaries of their own
    pub fn is_pseudo(self) -> bool {
        matches!(self, Self::Consumer | Self::Virtual)
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Downloaded => "Downloaded",
            Self::Cache => "Cache",
            Self::Updated => "Updated",
            Self::Editable => "Editable",
            Self::Consumer => "Consumer",
            Self::Virtual => "Virtual",
        };
        f.write_str(text)
    }
}

/// Binary verdict of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryStatus {
    Cache,
    Download,
    Update,
    Build,
    Missing,
    Skip,
    Editable,
    Invalid,
}

impl BinaryStatus {
    /// The binary exists somewhere and does not need building
    pub fn is_available(self) -> bool {
        matches!(self, Self::Cache | Self::Download | Self::Update)
    }
}

impl fmt::Display for BinaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Cache => "Cache",
            Self::Download => "Download",
            Self::Update => "Update",
            Self::Build => "Build",
            Self::Missing => "Missing",
            Self::Skip => "Skip",
            Self::Editable => "Editable",
            Self::Invalid => "Invalid",
        };
        f.write_str(text)
    }
}

/// Requirement context of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub enum Context {
    #[default]
    Host,
    Build,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Build => f.write_str("build"),
        }
    }
}

/// Propagation flags carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeKind {
    pub private: bool,
    pub build_require: bool,
}

impl EdgeKind {
    pub fn public() -> Self {
        Self::default()
    }

    /// Neither private nor build-require
    pub fn is_public(self) -> bool {
        !self.private && !self.build_require
    }
}

/// A directed requirement edge
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn private(&self) -> bool {
        self.kind.private
    }

    pub fn build_require(&self) -> bool {
        self.kind.build_require
    }
}

// Two edges between the same pair are the same edge, whatever their flags
impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src && self.dst == other.dst
    }
}

impl Eq for Edge {}

/// One resolved package configuration in the graph
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) reference: Option<PackageReference>,
    pub(crate) recipe_status: RecipeStatus,
    pub(crate) context: Context,
    pub(crate) recipe: Recipe,
    pub(crate) options: BTreeMap<String, String>,
    package_id: Option<String>,
    /// Package id computed before a compatible binary replaced it
    pub(crate) original_package_id: Option<String>,
    pub(crate) binary_revision: Option<String>,
    pub(crate) binary: Option<BinaryStatus>,
    /// Verdict kept when a node is skipped, restored if another path needs it
    pub(crate) binary_before_skip: Option<BinaryStatus>,
    pub(crate) invalid: Option<String>,
    pub(crate) dependencies: Vec<Edge>,
    pub(crate) dependants: Vec<Edge>,
    pub(crate) build_require: bool,
    pub(crate) private: bool,
    pub(crate) revision_pinned: bool,
    pub(crate) public_deps: IndexMap<String, NodeId>,
    pub(crate) public_closure: IndexMap<String, NodeId>,
    pub(crate) inverse_closure: BTreeSet<NodeId>,
    pub(crate) ancestors: BTreeSet<(Context, String)>,
}

impl Node {
    /// Create a node with empty edge sets; the id is set when added to a graph
    pub fn new(
        reference: Option<PackageReference>,
        recipe: Recipe,
        recipe_status: RecipeStatus,
    ) -> Self {
        Self {
            id: NodeId(usize::MAX),
            reference,
            recipe_status,
            context: Context::Host,
            recipe,
            options: BTreeMap::new(),
            package_id: None,
            original_package_id: None,
            binary_revision: None,
            binary: None,
            binary_before_skip: None,
            invalid: None,
            dependencies: Vec::new(),
            dependants: Vec::new(),
            build_require: false,
            private: false,
            revision_pinned: false,
            public_deps: IndexMap::new(),
            public_closure: IndexMap::new(),
            inverse_closure: BTreeSet::new(),
            ancestors: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn reference(&self) -> Option<&PackageReference> {
        self.reference.as_ref()
    }

    /// Package name, `None` for anonymous consumers
    pub fn name(&self) -> Option<&str> {
        self.reference.as_ref().map(PackageReference::name)
    }

    pub fn recipe_status(&self) -> RecipeStatus {
        self.recipe_status
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Effective option values after downstream propagation
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn package_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    /// The package id that was replaced by a compatible one, if any
    pub fn original_package_id(&self) -> Option<&str> {
        self.original_package_id.as_deref()
    }

    pub fn binary(&self) -> Option<BinaryStatus> {
        self.binary
    }

    pub fn binary_revision(&self) -> Option<&str> {
        self.binary_revision.as_deref()
    }

    /// Reason given by the validation hook, if it rejected the node
    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid.as_deref()
    }

    pub fn is_build_require(&self) -> bool {
        self.build_require
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_revision_pinned(&self) -> bool {
        self.revision_pinned
    }

    /// Whether this node is a consumer or virtual pseudo-node
    pub fn is_pseudo(&self) -> bool {
        self.recipe_status.is_pseudo()
    }

    /// Assign the configuration id; it can only be set once
    pub fn assign_package_id(&mut self, package_id: impl Into<String>) -> Result<()> {
        let package_id = package_id.into();
        if let Some(existing) = &self.package_id {
            return Err(GraphError::DuplicateAssignment {
                reference: self.display_name(),
                existing: existing.clone(),
                attempted: package_id,
            });
        }
        self.package_id = Some(package_id);
        Ok(())
    }

    /// Replace the package id with a compatible one, remembering the original
    pub(crate) fn substitute_package_id(&mut self, package_id: impl Into<String>) {
        if self.original_package_id.is_none() {
            self.original_package_id = self.package_id.take();
        }
        self.package_id = Some(package_id.into());
    }

    /// Binary reference, once reference and package id are both known
    pub fn pref(&self) -> Result<BinaryReference> {
        match (&self.reference, &self.package_id) {
            (Some(reference), Some(package_id)) => Ok(BinaryReference::new(
                reference.clone(),
                package_id.clone(),
            )
            .with_revision(self.binary_revision.clone())),
            _ => Err(GraphError::Unevaluated {
                reference: self.display_name(),
            }),
        }
    }

    /// Copy without edges and closure caches, used when collapsing a graph
    pub(crate) fn partial_copy(&self) -> Node {
        Node {
            id: NodeId(usize::MAX),
            reference: self.reference.clone(),
            recipe_status: self.recipe_status,
            context: self.context,
            recipe: self.recipe.clone(),
            options: self.options.clone(),
            package_id: self.package_id.clone(),
            original_package_id: self.original_package_id.clone(),
            binary_revision: self.binary_revision.clone(),
            binary: self.binary,
            binary_before_skip: self.binary_before_skip,
            invalid: self.invalid.clone(),
            dependencies: Vec::new(),
            dependants: Vec::new(),
            build_require: self.build_require,
            private: self.private,
            revision_pinned: self.revision_pinned,
            public_deps: IndexMap::new(),
            public_closure: IndexMap::new(),
            inverse_closure: BTreeSet::new(),
            ancestors: BTreeSet::new(),
        }
    }

    /// Add an edge touching this node. Outgoing edges keep their order and
    /// ignore repeated destinations; incoming edges behave as a set.
    pub fn add_edge(&mut self, edge: Edge) {
        if edge.src == self.id {
            if !self.dependencies.contains(&edge) {
                self.dependencies.push(edge);
            }
        } else if !self.dependants.contains(&edge) {
            self.dependants.push(edge);
        }
    }

    /// Outgoing edges in declaration order
    pub fn dependencies(&self) -> &[Edge] {
        &self.dependencies
    }

    /// Incoming edges in attachment order
    pub fn dependants(&self) -> &[Edge] {
        &self.dependants
    }

    pub fn neighbors(&self) -> Vec<NodeId> {
        self.dependencies.iter().map(|e| e.dst).collect()
    }

    pub fn private_neighbors(&self) -> Vec<NodeId> {
        self.dependencies
            .iter()
            .filter(|e| e.private())
            .map(|e| e.dst)
            .collect()
    }

    pub fn build_neighbors(&self) -> Vec<NodeId> {
        self.dependencies
            .iter()
            .filter(|e| e.build_require())
            .map(|e| e.dst)
            .collect()
    }

    pub fn inverse_neighbors(&self) -> Vec<NodeId> {
        self.dependants.iter().map(|e| e.src).collect()
    }

    /// Conflict scope: name -> node
    pub fn public_deps(&self) -> &IndexMap<String, NodeId> {
        &self.public_deps
    }

    /// Public transitive dependencies: name -> node
    pub fn public_closure(&self) -> &IndexMap<String, NodeId> {
        &self.public_closure
    }

    /// Nodes that have this one in their public closure
    pub fn inverse_closure(&self) -> &BTreeSet<NodeId> {
        &self.inverse_closure
    }

    /// Names of the ancestors of this node, with the context they live in
    pub fn ancestors(&self) -> &BTreeSet<(Context, String)> {
        &self.ancestors
    }

    /// Human readable name used in messages
    pub fn display_name(&self) -> String {
        match &self.reference {
            Some(reference) => reference.to_string(),
            None => match self.recipe_status {
                RecipeStatus::Virtual => "virtual".to_string(),
                _ => "consumer".to_string(),
            },
        }
    }

    /// Total order used to sort nodes inside a level
    pub fn order(&self, other: &Node) -> Ordering {
        self.order_key(other).then_with(|| self.id.cmp(&other.id))
    }

    fn order_key(&self, other: &Node) -> Ordering {
        match (self.is_pseudo(), other.is_pseudo()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (true, true) => return Ordering::Equal,
            (false, false) => {}
        }
        match (&self.reference, &other.reference) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                if a == b {
                    return Ordering::Equal;
                }
                match (a.revision(), b.revision()) {
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    _ => a.cmp(b),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: usize, reference: &str, status: RecipeStatus) -> Node {
        let mut n = Node::new(
            Some(PackageReference::parse(reference).unwrap()),
            Recipe::default(),
            status,
        );
        n.id = NodeId(id);
        n
    }

    #[test]
    fn test_assign_package_id_once() {
        let mut n = node(0, "liba/0.1#r1", RecipeStatus::Cache);
        n.assign_package_id("abc").unwrap();
        let err = n.assign_package_id("def").unwrap_err();
        assert!(matches!(err, GraphError::DuplicateAssignment { .. }));
        assert_eq!(n.package_id(), Some("abc"));
    }

    #[test]
    fn test_substitute_keeps_original() {
        let mut n = node(0, "liba/0.1#r1", RecipeStatus::Cache);
        n.assign_package_id("INVALID").unwrap();
        n.substitute_package_id("compat1");
        assert_eq!(n.package_id(), Some("compat1"));
        assert_eq!(n.original_package_id(), Some("INVALID"));
    }

    #[test]
    fn test_pref_requires_package_id() {
        let mut n = node(0, "liba/0.1#r1", RecipeStatus::Cache);
        assert!(matches!(n.pref(), Err(GraphError::Unevaluated { .. })));
        n.assign_package_id("abc").unwrap();
        assert_eq!(n.pref().unwrap().to_string(), "liba/0.1#r1:abc");
    }

    #[test]
    fn test_outgoing_edges_ignore_duplicates() {
        let mut n = node(0, "app/1.0#r", RecipeStatus::Cache);
        let e1 = Edge {
            src: NodeId(0),
            dst: NodeId(1),
            kind: EdgeKind::public(),
        };
        let e2 = Edge {
            src: NodeId(0),
            dst: NodeId(1),
            kind: EdgeKind {
                private: true,
                build_require: false,
            },
        };
        n.add_edge(e1);
        n.add_edge(e2);
        assert_eq!(n.dependencies().len(), 1);
        assert!(!n.dependencies()[0].private());
    }

    #[test]
    fn test_neighbor_accessors_filter_by_kind() {
        let mut n = node(0, "app/1.0#r", RecipeStatus::Cache);
        let kinds = [
            EdgeKind::public(),
            EdgeKind {
                private: true,
                build_require: false,
            },
            EdgeKind {
                private: false,
                build_require: true,
            },
        ];
        for (dst, kind) in kinds.into_iter().enumerate() {
            n.add_edge(Edge {
                src: NodeId(0),
                dst: NodeId(dst + 1),
                kind,
            });
        }
        assert_eq!(n.neighbors(), vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(n.private_neighbors(), vec![NodeId(2)]);
        assert_eq!(n.build_neighbors(), vec![NodeId(3)]);
    }

    #[test]
    fn test_incoming_edges_are_a_set() {
        let mut n = node(1, "liba/1.0#r", RecipeStatus::Cache);
        let e = Edge {
            src: NodeId(0),
            dst: NodeId(1),
            kind: EdgeKind::public(),
        };
        n.add_edge(e);
        n.add_edge(e);
        assert_eq!(n.inverse_neighbors(), vec![NodeId(0)]);
    }

    #[test]
    fn test_order_pseudo_nodes_last() {
        let consumer = node(0, "zzz/1.0", RecipeStatus::Consumer);
        let lib = node(1, "aaa/1.0#r", RecipeStatus::Cache);
        assert_eq!(consumer.order(&lib), Ordering::Greater);
        assert_eq!(lib.order(&consumer), Ordering::Less);
    }

    #[test]
    fn test_order_unrevisioned_after_revisioned() {
        let revisioned = node(0, "zzz/1.0#r", RecipeStatus::Cache);
        let plain = node(1, "aaa/1.0", RecipeStatus::Cache);
        assert_eq!(plain.order(&revisioned), Ordering::Greater);
    }

    #[test]
    fn test_order_by_reference_then_id() {
        let libb = node(3, "libb/0.1#r", RecipeStatus::Cache);
        let libc = node(2, "libc/0.1#r", RecipeStatus::Cache);
        assert_eq!(libb.order(&libc), Ordering::Less);
        let libb_dup = node(5, "libb/0.1#r", RecipeStatus::Cache);
        assert_eq!(libb.order(&libb_dup), Ordering::Less);
    }
}
