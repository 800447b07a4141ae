//! Build-order planning over an evaluated graph

use serde::Serialize;

use crate::dependency::graph::DepsGraph;
use crate::dependency::node::BinaryStatus;
use crate::error::{GraphError, Result};
use crate::reference::{BinaryReference, PackageReference};

/// One entry of a binary-level build plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBinary {
    /// Index of the node in the graph it was planned from
    pub node: usize,
    pub pref: String,
}

/// Serializable summary of what has to be built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub batches: Vec<Vec<PlannedBinary>>,
    pub nodes_to_build: Vec<String>,
}

/// Read-only planner over a resolved and evaluated graph
pub struct BuildOrderPlanner<'g> {
    graph: &'g DepsGraph,
}

impl<'g> BuildOrderPlanner<'g> {
    pub fn new(graph: &'g DepsGraph) -> Self {
        Self { graph }
    }

    /// Reference batches for the targets and their dependants
    pub fn build_order(&self, targets: &[String]) -> Vec<Vec<PackageReference>> {
        self.graph.build_order(targets)
    }

    pub fn new_build_order(&self) -> Vec<Vec<BinaryReference>> {
        self.graph
            .new_build_order()
            .into_iter()
            .map(|level| level.into_iter().map(|(_, pref)| pref).collect())
            .collect()
    }

    pub fn nodes_to_build(&self) -> Vec<PackageReference> {
        self.graph.nodes_to_build()
    }

    /// Full plan, failing first when a needed binary cannot be obtained
    pub fn plan(&self) -> Result<BuildPlan> {
        self.ensure_buildable()?;
        let batches = self
            .graph
            .new_build_order()
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .map(|(id, pref)| PlannedBinary {
                        node: id.index(),
                        pref: pref.to_string(),
                    })
                    .collect()
            })
            .collect();
        let nodes_to_build = self
            .nodes_to_build()
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(BuildPlan {
            batches,
            nodes_to_build,
        })
    }

    /// Escalate invalid and missing binaries into errors.
    ///
    /// Invalid nodes that got a compatible binary and skipped nodes are
    /// never reported.
    pub fn ensure_buildable(&self) -> Result<()> {
        let invalid: Vec<String> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.binary() == Some(BinaryStatus::Invalid))
            .filter_map(|n| {
                n.invalid_reason()
                    .map(|reason| format!("{}: {}", n.display_name(), reason))
            })
            .collect();
        if !invalid.is_empty() {
            return Err(GraphError::InvalidPackages { packages: invalid });
        }

        let missing: Vec<String> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.binary() == Some(BinaryStatus::Missing))
            .map(|n| n.display_name())
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::MissingPackages { packages: missing });
        }
        Ok(())
    }
}
