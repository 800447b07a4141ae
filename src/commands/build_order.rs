//! Build-order command - Reference batches to rebuild
//!
//! Usage:
//!   pkggraph build-order app/1.0                         # Everything, leaf-first
//!   pkggraph build-order app/1.0 --target liba           # liba and what depends on it
//!   pkggraph build-order app/1.0 --format json

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use pkggraph::dependency::graph::ALL;
use pkggraph::BuildOrderPlanner;

use super::{OutputFormat, Session};

/// Print the reference batches to rebuild for some targets
#[derive(Args, Debug)]
pub struct BuildOrderCommand {
    /// References to resolve
    #[arg(required = true)]
    pub references: Vec<String>,

    /// Changed packages (name, reference or ALL)
    #[arg(long, short = 't', default_value = ALL)]
    pub target: Vec<String>,

    /// Output format: text, json
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl BuildOrderCommand {
    /// Execute the build-order command
    pub fn execute(self, session: &Session, _verbose: bool) -> Result<()> {
        let graph = session.resolve(&self.references, &[])?;
        let batches = BuildOrderPlanner::new(&graph).build_order(&self.target);
        let batches: Vec<Vec<String>> = batches
            .iter()
            .map(|batch| batch.iter().map(ToString::to_string).collect())
            .collect();

        match self.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&batches).context("Failed to serialize build order")?
            ),
            OutputFormat::Text => {
                for (index, batch) in batches.iter().enumerate() {
                    println!("{} {}", style(format!("{}.", index + 1)).bold(), batch.join(", "));
                }
            }
        }
        Ok(())
    }
}
