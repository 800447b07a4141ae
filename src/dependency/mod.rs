//! Dependency graph engine
//!
//! This module provides the node and graph model, the resolver that expands a
//! root request into a graph, binary evaluation and build-order planning.

pub mod binaries;
pub mod graph;
pub mod node;
pub mod planner;
pub mod profile;
pub mod recipe;
pub mod requirement;
pub mod resolver;
pub mod validator;
pub mod version;

pub use binaries::{evaluate_graph, BinaryAnalyzer, BuildMode, StoreAnalyzer};
pub use graph::{DepsGraph, GraphStats, ALL};
pub use node::{BinaryStatus, Context, Edge, EdgeKind, Node, NodeId, RecipeStatus};
pub use planner::{BuildOrderPlanner, BuildPlan};
pub use recipe::{Recipe, RecipeLookup, ResolvedRecipe};
pub use requirement::{Requirement, Requirements};
pub use resolver::{resolve_graph, DepsResolver, RootRequest};
pub use validator::{RecipeValidator, Validator};
