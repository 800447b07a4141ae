//! pkggraph - dependency graph resolution for C/C++ package managers
//!
//! The library expands a root request into a [`DepsGraph`] through a
//! [`RecipeLookup`], assigns binary identities and verdicts through a
//! [`BinaryAnalyzer`], and plans build orders over the result.
//!
//! ```text
//! RootRequest → DepsResolver → DepsGraph → evaluate_graph → BuildOrderPlanner
//! ```

pub mod config;
pub mod dependency;
pub mod error;
pub mod reference;
pub mod registry;
pub mod utils;

pub use config::ResolverConfig;
pub use dependency::{
    evaluate_graph, resolve_graph, BinaryAnalyzer, BuildOrderPlanner, DepsGraph, DepsResolver,
    RecipeLookup, RootRequest,
};
pub use error::{GraphError, Result};
pub use reference::{BinaryReference, PackageReference};
pub use registry::RecipeIndex;
