//! Graph expansion
//!
//! The resolver turns a root request into a [`DepsGraph`]. Host requirements
//! are expanded first, depth-first in declaration order, through an explicit
//! work stack. Build-requires (from recipes and profile patterns) are expanded
//! afterwards, level by level, each one bringing its own subgraph.
//!
//! Name uniqueness is enforced per propagation scope: the `public_deps` map of
//! the requiring node for regular and private requirements, its
//! `public_closure` for build-requires.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::config::ResolverConfig;
use crate::dependency::graph::DepsGraph;
use crate::dependency::node::{Context, EdgeKind, Node, NodeId, RecipeStatus};
use crate::dependency::profile::BuildRequirePattern;
use crate::dependency::recipe::{PackageOptions, Recipe, RecipeLookup, ResolvedRecipe};
use crate::dependency::requirement::{Requirement, Requirements};
use crate::dependency::validator::{RecipeValidator, Validator};
use crate::dependency::version::VersionRange;
use crate::error::{GraphError, Result};
use crate::reference::PackageReference;

/// What the graph is built for
#[derive(Debug, Clone)]
pub enum RootRequest {
    /// An existing recipe, looked up like any other requirement
    Reference(PackageReference),
    /// The user's own recipe
    Consumer {
        reference: Option<PackageReference>,
        recipe: Recipe,
    },
    /// A synthetic root holding a list of requirements
    Virtual(Vec<Requirement>),
}

enum Task {
    Expand {
        node: NodeId,
        down_reqs: Rc<Requirements>,
        down_options: Rc<PackageOptions>,
    },
    Require {
        requirer: NodeId,
        requirement: Requirement,
        /// Requirements the new node receives if one is created
        down_reqs: Rc<Requirements>,
        down_options: Rc<PackageOptions>,
    },
}

/// Builds dependency graphs from recipe lookups
pub struct DepsResolver<'a> {
    lookup: &'a dyn RecipeLookup,
    validator: &'a dyn Validator,
    config: &'a ResolverConfig,

    /// Lookup results per requirement text
    cache: HashMap<String, Result<ResolvedRecipe>>,
}

impl<'a> DepsResolver<'a> {
    /// Create a resolver validating nodes with [`RecipeValidator`]
    pub fn new(lookup: &'a dyn RecipeLookup, config: &'a ResolverConfig) -> Self {
        Self {
            lookup,
            validator: &RecipeValidator,
            config,
            cache: HashMap::new(),
        }
    }

    /// Replace the validation hook
    pub fn with_validator(mut self, validator: &'a dyn Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Expand the whole graph for a root request
    pub fn load_graph(&mut self, root: RootRequest) -> Result<DepsGraph> {
        let mut graph = DepsGraph::new();
        let root = self.create_root(&mut graph, root)?;

        let stack = vec![Task::Expand {
            node: root,
            down_reqs: Rc::new(Requirements::new()),
            down_options: Rc::new(self.config.options.clone()),
        }];
        self.drain(&mut graph, stack)?;

        let all: BTreeSet<NodeId> = graph.nodes().iter().map(Node::id).collect();
        let patterns = self.config.build_requires.clone();
        self.expand_build_requires(&mut graph, &all, &patterns, root)?;

        debug!(
            "Resolved graph with {} nodes ({} aliases, {} unresolved)",
            graph.len(),
            graph.aliased().len(),
            graph.unresolved().len()
        );
        Ok(graph)
    }

    fn create_root(&mut self, graph: &mut DepsGraph, root: RootRequest) -> Result<NodeId> {
        let mut node = match root {
            RootRequest::Reference(reference) => {
                let resolved = self.lookup_recipe(graph, &reference)?;
                let mut node = Node::new(Some(resolved.reference), resolved.recipe, resolved.status);
                node.revision_pinned = reference.revision().is_some();
                node
            }
            RootRequest::Consumer { reference, recipe } => {
                Node::new(reference, recipe, RecipeStatus::Consumer)
            }
            RootRequest::Virtual(requires) => {
                Node::new(None, Recipe::with_requires(requires), RecipeStatus::Virtual)
            }
        };
        let overrides = node.name().and_then(|name| self.config.options.get(name));
        node.options = node.recipe.configure_options(overrides);
        Ok(graph.add_node(node))
    }

    fn drain(&mut self, graph: &mut DepsGraph, mut stack: Vec<Task>) -> Result<()> {
        while let Some(task) = stack.pop() {
            match task {
                Task::Expand {
                    node,
                    down_reqs,
                    down_options,
                } => self.expand_node(graph, node, &down_reqs, &down_options, &mut stack)?,
                Task::Require {
                    requirer,
                    requirement,
                    down_reqs,
                    down_options,
                } => {
                    if let Some(node) =
                        self.expand_require(graph, requirer, &requirement, &down_options)?
                    {
                        stack.push(Task::Expand {
                            node,
                            down_reqs,
                            down_options,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Compute the requirements of a node and schedule them
    fn expand_node(
        &mut self,
        graph: &mut DepsGraph,
        id: NodeId,
        down_reqs: &Requirements,
        down_options: &PackageOptions,
        stack: &mut Vec<Task>,
    ) -> Result<()> {
        let node = graph.node(id);
        let mut requirements: Requirements = node
            .recipe()
            .requires
            .iter()
            .filter(|r| !r.build_require)
            .cloned()
            .collect();
        let owner = node.name().map(str::to_string);
        let new_down_reqs = requirements.apply_overrides(down_reqs, owner.as_deref());
        let new_down_options = merge_options(&node.recipe().dependency_options, down_options);

        match self.validator.validate(graph, id) {
            Ok(()) => {}
            Err(GraphError::InvalidConfiguration { message, .. }) => {
                debug!("{}: invalid configuration: {}", graph.node(id).display_name(), message);
                graph.node_mut(id).invalid = Some(message);
            }
            Err(e) => return Err(e),
        }

        let active: Vec<Requirement> = requirements
            .iter()
            .filter(|r| !r.override_only)
            .cloned()
            .collect();
        if self.config.parallel_lookups() {
            self.prefetch(active.iter().map(|r| &r.reference));
        }

        let new_down_reqs = Rc::new(new_down_reqs);
        let new_down_options = Rc::new(new_down_options);
        // Reversed so the first requirement is expanded first
        for requirement in active.into_iter().rev() {
            stack.push(Task::Require {
                requirer: id,
                requirement,
                down_reqs: Rc::clone(&new_down_reqs),
                down_options: Rc::clone(&new_down_options),
            });
        }
        Ok(())
    }

    /// Resolve one requirement of `requirer`. Returns the node to expand when
    /// a new one was created.
    fn expand_require(
        &mut self,
        graph: &mut DepsGraph,
        requirer: NodeId,
        requirement: &Requirement,
        down_options: &PackageOptions,
    ) -> Result<Option<NodeId>> {
        let parent = graph.node(requirer);
        let context = if requirement.build_require && self.config.build_context() {
            Context::Build
        } else {
            parent.context()
        };
        let context_switch = context != parent.context();

        self.check_loop(graph, requirer, requirement.name(), &requirement.reference, context)?;
        self.check_depth(graph, requirer, &requirement.reference)?;

        let previous = if context_switch {
            None
        } else {
            let scope = if requirement.build_require {
                parent.public_closure()
            } else {
                parent.public_deps()
            };
            scope
                .get(requirement.name())
                .copied()
                .filter(|p| graph.node(*p).context() == context)
        };

        if let Some(previous) = previous {
            if !self.conflicts(graph, previous, requirement)? {
                self.reuse(graph, requirer, previous, requirement, down_options)?;
                return Ok(None);
            }
            if !requirement.private {
                return Err(self.conflict_error(graph, requirer, previous, requirement));
            }
            debug!(
                "{}: private requirement {} kept apart from {}",
                graph.node(requirer).display_name(),
                requirement.reference,
                graph.node(previous).display_name()
            );
        }

        let resolved = match self.lookup_recipe(graph, &requirement.reference) {
            Ok(resolved) => resolved,
            Err(e) if self.config.allow_missing() && e.is_missing_recipe() => {
                warn!("{}, skipping requirement", e.with_requirer(graph.node(requirer).display_name()));
                graph.unresolved.push(requirement.reference.to_string());
                return Ok(None);
            }
            Err(e) => return Err(e.with_requirer(graph.node(requirer).display_name())),
        };
        if resolved.reference.name() != requirement.name() {
            self.check_loop(graph, requirer, resolved.reference.name(), &resolved.reference, context)?;
        }

        let id = self.create_node(graph, requirer, requirement, resolved, context, down_options);
        Ok(Some(id))
    }

    fn check_loop(
        &self,
        graph: &DepsGraph,
        requirer: NodeId,
        name: &str,
        reference: &PackageReference,
        context: Context,
    ) -> Result<()> {
        let node = graph.node(requirer);
        let itself = node.name() == Some(name) && node.context() == context;
        if itself || node.ancestors().contains(&(context, name.to_string())) {
            return Err(GraphError::DependencyLoop {
                context: context.to_string(),
                requirer: node.display_name(),
                required: reference.to_string(),
            });
        }
        Ok(())
    }

    fn check_depth(
        &self,
        graph: &DepsGraph,
        requirer: NodeId,
        reference: &PackageReference,
    ) -> Result<()> {
        if let Some(max_depth) = self.config.max_depth() {
            if graph.node(requirer).ancestors().len() + 1 > max_depth {
                return Err(GraphError::MaxDepthExceeded {
                    reference: reference.to_string(),
                    max_depth,
                });
            }
        }
        Ok(())
    }

    /// Whether an existing node cannot satisfy the requirement
    fn conflicts(&self, graph: &DepsGraph, previous: NodeId, requirement: &Requirement) -> Result<bool> {
        let Some(existing) = graph.node(previous).reference() else {
            return Ok(false);
        };
        let requested = resolve_alias(graph, &requirement.reference);

        if let Some(expression) = requested.range_expression() {
            let range = VersionRange::parse(expression)?;
            let satisfied = range.matches(existing.version()) && existing.same_namespace(&requested);
            if satisfied {
                trace!("Range {} satisfied by {}", requested, existing);
            }
            return Ok(!satisfied);
        }

        if existing.cleared() != requested.cleared() {
            return Ok(true);
        }
        Ok(match requested.revision() {
            Some(revision) => existing.revision() != Some(revision),
            None => false,
        })
    }

    fn conflict_error(
        &self,
        graph: &DepsGraph,
        requirer: NodeId,
        previous: NodeId,
        requirement: &Requirement,
    ) -> GraphError {
        let node = graph.node(previous);
        let previous_requirer = node
            .dependants()
            .first()
            .map(|e| graph.node(e.src).display_name())
            .unwrap_or_else(|| "a downstream package".to_string());
        let existing = node.reference().cloned();
        let consumer = graph.node(requirer).display_name();
        let requested = requirement.reference.to_string();

        let revision_only = existing
            .as_ref()
            .is_some_and(|e| e.cleared() == requirement.reference.cleared());
        let previous = existing.map(|e| e.to_string()).unwrap_or_default();
        let name = requirement.name().to_string();
        if revision_only {
            GraphError::RevisionConflict {
                name,
                consumer,
                requested,
                previous_requirer,
                previous,
            }
        } else {
            GraphError::VersionConflict {
                name,
                consumer,
                requested,
                previous_requirer,
                previous,
            }
        }
    }

    /// Attach an existing node to a new dependant
    fn reuse(
        &self,
        graph: &mut DepsGraph,
        requirer: NodeId,
        previous: NodeId,
        requirement: &Requirement,
        down_options: &PackageOptions,
    ) -> Result<()> {
        trace!(
            "{} reuses {}",
            graph.node(requirer).display_name(),
            graph.node(previous).display_name()
        );

        let lineage = lineage_of(graph.node(requirer));
        let upstream: Vec<NodeId> = std::iter::once(previous)
            .chain(graph.node(previous).public_closure().values().copied())
            .collect();
        for id in &upstream {
            graph.node_mut(*id).ancestors.extend(lineage.iter().cloned());
        }

        if graph.node(previous).is_private() && !requirement.private {
            graph.make_public(previous);
        }

        graph.add_edge(requirer, previous, edge_kind(requirement));

        if requirement.is_public() {
            let dependants = with_inverse_closure(graph, requirer);
            for source in &dependants {
                for target in &upstream {
                    graph.connect_closure(*source, *target);
                }
            }
        }

        self.check_options(graph, requirer, previous, down_options)
    }

    fn check_options(
        &self,
        graph: &DepsGraph,
        requirer: NodeId,
        previous: NodeId,
        down_options: &PackageOptions,
    ) -> Result<()> {
        let node = graph.node(previous);
        let Some(requested) = node.name().and_then(|name| down_options.get(name)) else {
            return Ok(());
        };
        for (option, value) in requested {
            if let Some(existing) = node.options().get(option) {
                if existing != value {
                    return Err(GraphError::OptionConflict {
                        consumer: graph.node(requirer).display_name(),
                        reference: node.display_name(),
                        option: option.clone(),
                        requested: value.clone(),
                        existing: existing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn create_node(
        &self,
        graph: &mut DepsGraph,
        requirer: NodeId,
        requirement: &Requirement,
        resolved: ResolvedRecipe,
        context: Context,
        down_options: &PackageOptions,
    ) -> NodeId {
        let parent = graph.node(requirer);
        let name = resolved.reference.name().to_string();
        let context_switch = context != parent.context();

        let mut node = Node::new(Some(resolved.reference), resolved.recipe, resolved.status);
        node.context = context;
        node.build_require = parent.is_build_require() || requirement.build_require;
        node.private = parent.is_private() || requirement.private;
        node.revision_pinned = requirement.reference.revision().is_some();
        node.ancestors = lineage_of(parent);
        node.options = node.recipe.configure_options(down_options.get(&name));
        node.public_deps = if context_switch {
            IndexMap::new()
        } else if requirement.is_public() {
            parent.public_deps().clone()
        } else {
            parent.public_closure().clone()
        };

        let id = graph.add_node(node);
        graph.node_mut(id).public_deps.insert(name.clone(), id);
        graph.add_edge(requirer, id, edge_kind(requirement));

        if requirement.is_public() {
            for source in with_inverse_closure(graph, requirer) {
                graph.connect_closure(source, id);
            }
        } else if requirement.private && !requirement.build_require {
            // Visible to later siblings, never to the requirer's dependants
            graph
                .node_mut(requirer)
                .public_deps
                .entry(name)
                .or_insert(id);
        }

        debug!(
            "{} requires {}{}",
            graph.node(requirer).display_name(),
            graph.node(id).display_name(),
            match (requirement.private, requirement.build_require) {
                (_, true) => " (build)",
                (true, false) => " (private)",
                _ => "",
            }
        );
        id
    }

    /// Look a reference up, following alias recipes
    fn lookup_recipe(
        &mut self,
        graph: &mut DepsGraph,
        reference: &PackageReference,
    ) -> Result<ResolvedRecipe> {
        let mut chain = vec![reference.to_string()];
        let mut resolved = self.cached_resolve(reference)?;

        while let Some(target) = resolved.alias().cloned() {
            let key = target.to_string();
            if chain.contains(&key) {
                chain.push(key);
                return Err(GraphError::AliasLoop { chain });
            }
            let source = chain.last().cloned().unwrap_or_default();
            debug!("Alias {} redirected to {}", source, target);
            graph.aliased.insert(source, target.clone());
            chain.push(key);
            resolved = self.cached_resolve(&target)?;
        }
        Ok(resolved)
    }

    fn cached_resolve(&mut self, reference: &PackageReference) -> Result<ResolvedRecipe> {
        let key = reference.to_string();
        if let Some(result) = self.cache.get(&key) {
            return result.clone();
        }
        let result = self.lookup.resolve(reference);
        self.cache.insert(key, result.clone());
        result
    }

    /// Run the lookups of sibling requirements in parallel
    fn prefetch<'r, I>(&mut self, references: I)
    where
        I: IntoIterator<Item = &'r PackageReference>,
    {
        let mut seen = HashSet::new();
        let pending: Vec<&PackageReference> = references
            .into_iter()
            .filter(|r| !self.cache.contains_key(&r.to_string()))
            .filter(|r| seen.insert(r.to_string()))
            .collect();
        if pending.len() < 2 {
            return;
        }

        trace!("Prefetching {} recipes", pending.len());
        let lookup = self.lookup;
        let results: Vec<(String, Result<ResolvedRecipe>)> = pending
            .par_iter()
            .map(|r| (r.to_string(), lookup.resolve(r)))
            .collect();
        self.cache.extend(results);
    }

    /// Expand the build-requires of every node of `subset`, leaf-first
    fn expand_build_requires(
        &mut self,
        graph: &mut DepsGraph,
        subset: &BTreeSet<NodeId>,
        patterns: &[BuildRequirePattern],
        owner: NodeId,
    ) -> Result<()> {
        let default_context = if self.config.build_context() {
            Context::Build
        } else {
            Context::Host
        };

        for id in graph.levels_of(subset).into_iter().flatten() {
            let node = graph.node(id);
            if node.recipe_status() == RecipeStatus::Virtual {
                continue;
            }

            let mut package_brs: IndexMap<String, PackageReference> = node
                .recipe()
                .build_requires
                .iter()
                .cloned()
                .chain(
                    node.recipe()
                        .requires
                        .iter()
                        .filter(|r| r.build_require)
                        .map(|r| r.reference.clone()),
                )
                .map(|r| (r.name().to_string(), r))
                .collect();

            let mut profile_brs = Vec::new();
            for pattern in patterns {
                if !pattern.applies_to(node.reference(), id == owner) {
                    continue;
                }
                for reference in &pattern.refs {
                    if let Some(slot) = package_brs.get_mut(reference.name()) {
                        *slot = reference.clone();
                    } else if node.name() != Some(reference.name())
                        || node.context() != default_context
                    {
                        profile_brs.push(reference.clone());
                    }
                }
            }

            if !package_brs.is_empty() {
                let refs: Vec<PackageReference> = package_brs.into_values().collect();
                let added = self.extend_build_requires(graph, id, refs)?;
                self.expand_build_requires(graph, &added, patterns, id)?;
            }
            if !profile_brs.is_empty() {
                let added = self.extend_build_requires(graph, id, profile_brs)?;
                self.expand_build_requires(graph, &added, &[], id)?;
            }
        }
        Ok(())
    }

    /// Expand build-requires of one node; returns the nodes created
    fn extend_build_requires(
        &mut self,
        graph: &mut DepsGraph,
        owner: NodeId,
        refs: Vec<PackageReference>,
    ) -> Result<BTreeSet<NodeId>> {
        let before = graph.len();
        let down_reqs = Rc::new(Requirements::new());
        let down_options = Rc::new(self.config.options.clone());
        if self.config.parallel_lookups() {
            self.prefetch(refs.iter());
        }

        let stack: Vec<Task> = refs
            .into_iter()
            .rev()
            .map(|reference| Task::Require {
                requirer: owner,
                requirement: Requirement::build(reference),
                down_reqs: Rc::clone(&down_reqs),
                down_options: Rc::clone(&down_options),
            })
            .collect();
        self.drain(graph, stack)?;

        let added: BTreeSet<NodeId> = (before..graph.len()).map(NodeId).collect();
        for id in &added {
            graph.node_mut(*id).build_require = true;
        }
        Ok(added)
    }
}

/// Build a graph with the default validator
pub fn resolve_graph(
    lookup: &dyn RecipeLookup,
    config: &ResolverConfig,
    root: RootRequest,
) -> Result<DepsGraph> {
    DepsResolver::new(lookup, config).load_graph(root)
}

fn edge_kind(requirement: &Requirement) -> EdgeKind {
    EdgeKind {
        private: requirement.private,
        build_require: requirement.build_require,
    }
}

/// Ancestors of a node's children: its own ancestors plus itself
fn lineage_of(node: &Node) -> BTreeSet<(Context, String)> {
    let mut lineage = node.ancestors().clone();
    if let Some(name) = node.name() {
        lineage.insert((node.context(), name.to_string()));
    }
    lineage
}

fn with_inverse_closure(graph: &DepsGraph, id: NodeId) -> Vec<NodeId> {
    std::iter::once(id)
        .chain(graph.node(id).inverse_closure().iter().copied())
        .collect()
}

/// Follow recorded alias redirections
fn resolve_alias(graph: &DepsGraph, reference: &PackageReference) -> PackageReference {
    let mut current = reference.clone();
    let mut seen = HashSet::new();
    while let Some(target) = graph.aliased().get(&current.to_string()) {
        if !seen.insert(current.to_string()) {
            break;
        }
        current = target.clone();
    }
    current
}

/// Recipe values for dependencies, overridden by the values coming from downstream
fn merge_options(recipe: &PackageOptions, downstream: &PackageOptions) -> PackageOptions {
    let mut merged: PackageOptions = recipe.clone();
    for (package, values) in downstream {
        merged
            .entry(package.clone())
            .or_insert_with(BTreeMap::new)
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
