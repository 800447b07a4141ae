//! Configuration validation hook
//!
//! Runs once per node, after its requirements are known and before its
//! package id is computed. Returning `GraphError::InvalidConfiguration` marks
//! the node invalid; any other error aborts the resolution.

use crate::dependency::graph::DepsGraph;
use crate::dependency::node::NodeId;
use crate::error::{GraphError, Result};

pub trait Validator: Send + Sync {
    fn validate(&self, graph: &DepsGraph, node: NodeId) -> Result<()>;
}

/// Checks the `invalid_configurations` rules declared by each recipe
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeValidator;

impl Validator for RecipeValidator {
    fn validate(&self, graph: &DepsGraph, node: NodeId) -> Result<()> {
        let node = graph.node(node);
        for rule in &node.recipe().invalid_configurations {
            if node.options().get(&rule.option) == Some(&rule.value) {
                return Err(GraphError::invalid_configuration(
                    node.display_name(),
                    rule.message.clone(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::node::{Node, RecipeStatus};
    use crate::dependency::recipe::{InvalidRule, Recipe};
    use crate::reference::PackageReference;

    fn graph_with(shared: &str) -> DepsGraph {
        let recipe = Recipe {
            invalid_configurations: vec![InvalidRule {
                option: "shared".to_string(),
                value: "True".to_string(),
                message: "shared builds are not supported".to_string(),
            }],
            ..Recipe::default()
        };
        let mut node = Node::new(
            Some(PackageReference::parse("liba/1.0").unwrap()),
            recipe,
            RecipeStatus::Cache,
        );
        node.options.insert("shared".to_string(), shared.to_string());
        let mut graph = DepsGraph::new();
        graph.add_node(node);
        graph
    }

    #[test]
    fn test_matching_rule_rejects() {
        let graph = graph_with("True");
        let err = RecipeValidator.validate(&graph, NodeId(0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "liba/1.0: Invalid ID: shared builds are not supported"
        );
    }

    #[test]
    fn test_other_values_pass() {
        let graph = graph_with("False");
        assert!(RecipeValidator.validate(&graph, NodeId(0)).is_ok());
    }
}
