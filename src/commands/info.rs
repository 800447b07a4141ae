//! Info command - Resolve a graph and show its nodes
//!
//! Usage:
//!   pkggraph info app/1.0                  # Levels with recipe and binary status
//!   pkggraph info app/1.0 --tree           # Indented dependency tree
//!   pkggraph info liba/1.0 libb/1.0        # Several references under a virtual root
//!   pkggraph info app/1.0 --format json    # Machine-readable output

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;

use pkggraph::dependency::graph::GraphStats;
use pkggraph::dependency::node::Node;
use pkggraph::DepsGraph;

use super::{OutputFormat, Session};

/// Resolve a graph and show every node by level
#[derive(Args, Debug)]
pub struct InfoCommand {
    /// References to resolve
    #[arg(required = true)]
    pub references: Vec<String>,

    /// Build mode entries, overriding the profile (e.g. missing, "!zlib")
    #[arg(long, short = 'b')]
    pub build: Vec<String>,

    /// Print the dependency tree instead of levels
    #[arg(long)]
    pub tree: bool,

    /// Output format: text, json
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug)]
struct GraphJson {
    nodes: Vec<NodeJson>,
    levels: Vec<Vec<usize>>,
    aliased: BTreeMap<String, String>,
    unresolved: Vec<String>,
    stats: GraphStats,
}

#[derive(Serialize, Debug)]
struct NodeJson {
    id: usize,
    reference: String,
    context: String,
    recipe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid: Option<String>,
    build_require: bool,
    private: bool,
    dependencies: Vec<usize>,
}

impl NodeJson {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id().index(),
            reference: node.display_name(),
            context: node.context().to_string(),
            recipe: node.recipe_status().to_string(),
            package_id: node.package_id().map(str::to_string),
            binary: node.binary().map(|b| b.to_string()),
            invalid: node.invalid_reason().map(str::to_string),
            build_require: node.is_build_require(),
            private: node.is_private(),
            dependencies: node.neighbors().iter().map(|id| id.index()).collect(),
        }
    }
}

impl InfoCommand {
    /// Execute the info command
    pub fn execute(self, session: &Session, verbose: bool) -> Result<()> {
        let graph = session.resolve(&self.references, &self.build)?;

        match self.format {
            OutputFormat::Json => {
                let json = to_json(&graph);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json).context("Failed to serialize graph")?
                );
            }
            OutputFormat::Text if self.tree => print!("{}", graph.format_tree()),
            OutputFormat::Text => print_levels(&graph, verbose),
        }
        Ok(())
    }
}

fn to_json(graph: &DepsGraph) -> GraphJson {
    GraphJson {
        nodes: graph.nodes().iter().map(NodeJson::from_node).collect(),
        levels: graph
            .by_levels()
            .into_iter()
            .map(|level| level.into_iter().map(|id| id.index()).collect())
            .collect(),
        aliased: graph
            .aliased()
            .iter()
            .map(|(from, to)| (from.clone(), to.to_string()))
            .collect(),
        unresolved: graph.unresolved().to_vec(),
        stats: graph.stats(),
    }
}

fn print_levels(graph: &DepsGraph, verbose: bool) {
    for (index, level) in graph.by_levels().into_iter().enumerate() {
        println!("{}", style(format!("Level {}", index)).bold());
        for id in level {
            let node = graph.node(id);
            let mut flags = Vec::new();
            if node.is_build_require() {
                flags.push("build-require");
            }
            if node.is_private() {
                flags.push("private");
            }
            let binary = node
                .binary()
                .map(|b| format!(" {}", style(b).cyan()))
                .unwrap_or_default();
            println!(
                "  {} ({}){}{}",
                style(node.display_name()).green(),
                node.recipe_status(),
                binary,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                }
            );
            if verbose {
                if let Some(package_id) = node.package_id() {
                    println!("      package_id: {}", package_id);
                }
                println!("      context: {}", node.context());
            }
            if let Some(reason) = node.invalid_reason() {
                println!("      {} {}", style("invalid:").red(), reason);
            }
        }
    }

    let stats = graph.stats();
    println!(
        "\n{} nodes, {} edges, depth {}",
        stats.node_count, stats.edge_count, stats.depth
    );
}
