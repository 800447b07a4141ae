//! Binary evaluation
//!
//! After expansion every node gets a package id and a binary status. Nodes are
//! visited leaf-first so the package ids of dependencies exist when a
//! dependant's id is computed. A second pass marks binaries that are not
//! needed at all as [`BinaryStatus::Skip`].

use std::collections::HashSet;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::dependency::graph::DepsGraph;
use crate::dependency::node::{BinaryStatus, NodeId, RecipeStatus};
use crate::error::{GraphError, Result};
use crate::reference::{BinaryReference, PackageReference};

/// Package id given to nodes rejected by validation
pub const PACKAGE_ID_INVALID: &str = "INVALID";

/// Answer of the binary analyzer for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: BinaryStatus,
    pub revision: Option<String>,
    /// A different package id whose binary can be used instead
    pub compatible_package_id: Option<String>,
}

impl Classification {
    pub fn new(status: BinaryStatus) -> Self {
        Self {
            status,
            revision: None,
            compatible_package_id: None,
        }
    }
}

/// Binary analysis collaborator
pub trait BinaryAnalyzer {
    /// Configuration id of a node; dependencies are already evaluated
    fn package_id(&self, graph: &DepsGraph, node: NodeId) -> Result<String> {
        default_package_id(graph, node)
    }

    /// Decide where the binary of a node comes from
    fn classify(&self, graph: &DepsGraph, node: NodeId) -> Result<Classification>;
}

/// SHA-256 over the reference, sorted options and direct host dependencies
pub fn default_package_id(graph: &DepsGraph, node: NodeId) -> Result<String> {
    let node = graph.node(node);
    let mut hasher = Sha256::new();
    match node.reference() {
        Some(reference) => hasher.update(reference.cleared().to_string().as_bytes()),
        None => hasher.update(node.display_name().as_bytes()),
    }
    hasher.update(b"\n[options]\n");
    for (name, value) in node.options() {
        hasher.update(format!("{}={}\n", name, value).as_bytes());
    }
    hasher.update(b"[requires]\n");
    for edge in node.dependencies().iter().filter(|e| !e.build_require()) {
        let pref = graph.node(edge.dst).pref()?;
        hasher.update(format!("{}:{}\n", pref.reference, pref.package_id).as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    Ok(digest[..40].to_string())
}

/// Where a stored binary lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BinaryLocation {
    /// Local cache, up to date
    #[default]
    Cache,
    /// Only in a remote
    Remote,
    /// Local copy older than the remote one
    Outdated,
}

impl BinaryLocation {
    pub fn status(self) -> BinaryStatus {
        match self {
            Self::Cache => BinaryStatus::Cache,
            Self::Remote => BinaryStatus::Download,
            Self::Outdated => BinaryStatus::Update,
        }
    }
}

/// A stored binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    pub location: BinaryLocation,
    pub revision: Option<String>,
}

/// Binary availability collaborator
pub trait BinaryStore: Send + Sync {
    fn find(&self, pref: &BinaryReference) -> Option<BinaryRecord>;

    /// Package ids, in preference order, whose binaries can replace `pref`
    fn compatible_ids(&self, _pref: &BinaryReference) -> Vec<String> {
        Vec::new()
    }
}

impl<T: BinaryStore + ?Sized> BinaryStore for &T {
    fn find(&self, pref: &BinaryReference) -> Option<BinaryRecord> {
        (**self).find(pref)
    }

    fn compatible_ids(&self, pref: &BinaryReference) -> Vec<String> {
        (**self).compatible_ids(pref)
    }
}

/// `--build` policy
///
/// - empty entry or `*`: build everything
/// - `missing`: build what has no binary
/// - name or glob: build matching packages
/// - `!pattern`: never build matching packages
/// - `never`: never build anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMode {
    all: bool,
    missing: bool,
    never: bool,
    patterns: Vec<String>,
    excluded: Vec<String>,
}

impl BuildMode {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut mode = BuildMode::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            match entry {
                "" | "*" => mode.all = true,
                "missing" => mode.missing = true,
                "never" => mode.never = true,
                _ => {
                    let (target, pattern) = match entry.strip_prefix('!') {
                        Some(p) => (&mut mode.excluded, p),
                        None => (&mut mode.patterns, entry),
                    };
                    Pattern::new(pattern).map_err(|e| {
                        GraphError::malformed(entry, format!("invalid build pattern: {}", e))
                    })?;
                    target.push(pattern.to_string());
                }
            }
        }
        if mode.never && (mode.all || mode.missing || !mode.patterns.is_empty()) {
            return Err(GraphError::malformed(
                "never",
                "build mode 'never' cannot be combined with other modes",
            ));
        }
        Ok(mode)
    }

    fn matches(patterns: &[String], reference: &PackageReference) -> bool {
        let full = reference.cleared().to_string();
        patterns.iter().any(|p| {
            p == reference.name()
                || Pattern::new(p)
                    .map(|g| g.matches(&full) || g.matches(reference.name()))
                    .unwrap_or(false)
        })
    }

    fn excluded(&self, reference: &PackageReference) -> bool {
        Self::matches(&self.excluded, reference)
    }

    /// Build from sources even when a binary exists
    pub fn forced(&self, reference: &PackageReference) -> bool {
        !self.never
            && !self.excluded(reference)
            && (self.all || Self::matches(&self.patterns, reference))
    }

    /// Build when no binary exists
    pub fn builds_missing(&self, reference: &PackageReference) -> bool {
        !self.never && !self.excluded(reference) && (self.missing || self.forced(reference))
    }
}

/// Analyzer backed by a [`BinaryStore`] and a [`BuildMode`]
pub struct StoreAnalyzer<S> {
    store: S,
    mode: BuildMode,
}

impl<S: BinaryStore> StoreAnalyzer<S> {
    pub fn new(store: S, mode: BuildMode) -> Self {
        Self { store, mode }
    }

    fn find_compatible(&self, pref: &BinaryReference) -> Option<Classification> {
        self.store.compatible_ids(pref).into_iter().find_map(|id| {
            let candidate = BinaryReference::new(pref.reference.clone(), id.clone());
            self.store.find(&candidate).map(|record| Classification {
                status: record.location.status(),
                revision: record.revision,
                compatible_package_id: Some(id),
            })
        })
    }
}

impl<S: BinaryStore> BinaryAnalyzer for StoreAnalyzer<S> {
    fn classify(&self, graph: &DepsGraph, node: NodeId) -> Result<Classification> {
        let node = graph.node(node);
        let pref = node.pref()?;

        if node.invalid_reason().is_some() {
            return Ok(self
                .find_compatible(&pref)
                .unwrap_or_else(|| Classification::new(BinaryStatus::Invalid)));
        }

        if self.mode.forced(&pref.reference) {
            return Ok(Classification::new(BinaryStatus::Build));
        }

        if let Some(record) = self.store.find(&pref) {
            return Ok(Classification {
                status: record.location.status(),
                revision: record.revision,
                compatible_package_id: None,
            });
        }

        if let Some(compatible) = self.find_compatible(&pref) {
            return Ok(compatible);
        }

        if self.mode.builds_missing(&pref.reference) {
            Ok(Classification::new(BinaryStatus::Build))
        } else {
            Ok(Classification::new(BinaryStatus::Missing))
        }
    }
}

/// Assign package ids and binary statuses to every node, then apply the skip rules
pub fn evaluate_graph(graph: &mut DepsGraph, analyzer: &dyn BinaryAnalyzer) -> Result<()> {
    for id in graph.ordered_iterate() {
        if graph.node(id).package_id().is_some() {
            continue;
        }
        evaluate_node(graph, analyzer, id)?;
    }
    skip_binaries(graph);
    Ok(())
}

fn evaluate_node(graph: &mut DepsGraph, analyzer: &dyn BinaryAnalyzer, id: NodeId) -> Result<()> {
    let node = graph.node(id);
    let pseudo = node.is_pseudo();
    let package_id = if node.invalid_reason().is_some() && !pseudo {
        PACKAGE_ID_INVALID.to_string()
    } else {
        analyzer.package_id(graph, id)?
    };
    graph.node_mut(id).assign_package_id(package_id)?;

    if pseudo {
        return Ok(());
    }
    if graph.node(id).recipe_status() == RecipeStatus::Editable {
        graph.node_mut(id).binary = Some(BinaryStatus::Editable);
        return Ok(());
    }

    let pref = graph.node(id).pref()?.cleared();
    if let Some(&first) = graph.evaluated.get(&pref).and_then(|nodes| nodes.first()) {
        let previous = graph.node(first);
        // A skipped verdict belongs to the previous node only
        let binary = match previous.binary {
            Some(BinaryStatus::Skip) => previous.binary_before_skip,
            other => other,
        };
        let revision = previous.binary_revision.clone();
        let substituted = previous
            .original_package_id()
            .and(previous.package_id())
            .map(str::to_string);
        let node = graph.node_mut(id);
        if let Some(compatible) = substituted {
            node.substitute_package_id(compatible);
        }
        node.binary = binary;
        node.binary_revision = revision;
        if let Some(nodes) = graph.evaluated.get_mut(&pref) {
            nodes.push(id);
        }
        return Ok(());
    }
    graph.evaluated.insert(pref, vec![id]);

    let classification = analyzer.classify(graph, id)?;
    let node = graph.node_mut(id);
    if let Some(compatible) = classification.compatible_package_id {
        debug!(
            "{}: using compatible package id {} instead of {}",
            node.display_name(),
            compatible,
            node.package_id().unwrap_or_default()
        );
        node.substitute_package_id(compatible);
    }
    node.binary = Some(classification.status);
    node.binary_revision = classification.revision;
    Ok(())
}

fn is_available_or_skipped(status: Option<BinaryStatus>) -> bool {
    matches!(status, Some(s) if s.is_available() || s == BinaryStatus::Skip)
}

fn skip(graph: &mut DepsGraph, id: NodeId) {
    let node = graph.node_mut(id);
    if node.binary != Some(BinaryStatus::Skip) {
        node.binary_before_skip = node.binary;
        node.binary = Some(BinaryStatus::Skip);
    }
}

/// Mark binaries nobody needs as skipped
pub fn skip_binaries(graph: &mut DepsGraph) {
    skip_private(graph);
    skip_build_requires(graph);
}

/// Private dependencies of a package that is not built are not needed
fn skip_private(graph: &mut DepsGraph) {
    let mut pending: Vec<NodeId> = graph
        .nodes()
        .iter()
        .filter(|n| is_available_or_skipped(n.binary()))
        .flat_map(|n| n.private_neighbors())
        .collect();
    let mut visited = HashSet::new();

    while let Some(neighbor) = pending.pop() {
        if !visited.insert(neighbor) || !graph.node(neighbor).is_private() {
            continue;
        }
        let members: Vec<NodeId> = std::iter::once(neighbor)
            .chain(graph.node(neighbor).public_closure().values().copied())
            .collect();
        for member in members {
            let node = graph.node(member);
            if node.is_private() && node.binary().is_some_and(BinaryStatus::is_available) {
                pending.extend(node.private_neighbors());
                skip(graph, member);
            }
        }
    }
}

/// Build-requires are only needed by packages that get built
fn skip_build_requires(graph: &mut DepsGraph) {
    let Some(root) = graph.root() else {
        return;
    };
    let mut needed = HashSet::new();
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        if !needed.insert(id) {
            continue;
        }
        let node = graph.node(id);
        let builds = node.is_pseudo()
            || matches!(
                node.binary(),
                Some(BinaryStatus::Build) | Some(BinaryStatus::Editable)
            );
        for edge in node.dependencies() {
            if edge.build_require() && !builds {
                continue;
            }
            pending.push(edge.dst);
        }
    }

    let unneeded: Vec<NodeId> = graph
        .nodes()
        .iter()
        .filter(|n| n.is_build_require() && !needed.contains(&n.id()) && n.binary().is_some())
        .map(|n| n.id())
        .collect();
    for id in unneeded {
        debug!("Skipping unneeded build-require {}", graph.node(id).display_name());
        skip(graph, id);
    }
}
