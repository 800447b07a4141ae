//! Command implementations
//!
//! Each command module provides a clap-derived struct and execute method.
//! [`Session`] holds what every command needs: the recipe index and the
//! resolver profile.

pub mod build_order;
pub mod build_plan;
pub mod info;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;

use pkggraph::dependency::binaries::{evaluate_graph, BuildMode, StoreAnalyzer};
use pkggraph::dependency::requirement::Requirement;
use pkggraph::utils::terminal::{create_spinner, print_warning};
use pkggraph::{resolve_graph, DepsGraph, PackageReference, RecipeIndex, ResolverConfig, RootRequest};

/// Output format shared by the commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Text format (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Loaded inputs of one invocation
pub struct Session {
    pub index: RecipeIndex,
    pub config: ResolverConfig,
}

impl Session {
    pub fn load(index: &Path, profile: Option<&Path>) -> Result<Self> {
        let index = RecipeIndex::load_from_path(index)?;
        let config = match profile {
            Some(path) => ResolverConfig::load_from_path(path)?,
            None => ResolverConfig::default(),
        };
        Ok(Self { index, config })
    }

    /// Resolve the references and evaluate binaries.
    ///
    /// One reference becomes the root itself; several are gathered under a
    /// virtual root. `build` overrides the profile build mode when not empty.
    pub fn resolve(&self, references: &[String], build: &[String]) -> Result<DepsGraph> {
        let mut parsed = references
            .iter()
            .map(|r| PackageReference::parse(r))
            .collect::<pkggraph::Result<Vec<_>>>()?;
        let root = if parsed.len() == 1 {
            RootRequest::Reference(parsed.remove(0))
        } else {
            RootRequest::Virtual(parsed.into_iter().map(Requirement::new).collect())
        };

        let spinner = create_spinner("Resolving dependency graph...");
        let result = resolve_graph(&self.index, &self.config, root);
        spinner.finish_and_clear();
        let mut graph = result?;

        for missing in graph.unresolved() {
            print_warning(&format!("Recipe not found, skipped: {}", missing));
        }

        let mode = if build.is_empty() {
            BuildMode::parse(self.config.build.mode.as_slice())
        } else {
            BuildMode::parse(build)
        }
        .context("Invalid build mode")?;
        let analyzer = StoreAnalyzer::new(&self.index, mode);
        evaluate_graph(&mut graph, &analyzer)?;
        Ok(graph)
    }
}
