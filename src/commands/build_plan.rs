//! Build-plan command - Binaries to build
//!
//! Usage:
//!   pkggraph build-plan app/1.0 --build missing
//!   pkggraph build-plan app/1.0 --format json

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use pkggraph::utils::terminal::{print_info, print_success};
use pkggraph::BuildOrderPlanner;

use super::{OutputFormat, Session};

/// Print the binaries to build, leaf-first
#[derive(Args, Debug)]
pub struct BuildPlanCommand {
    /// References to resolve
    #[arg(required = true)]
    pub references: Vec<String>,

    /// Build mode entries, overriding the profile (e.g. missing, "!zlib")
    #[arg(long, short = 'b')]
    pub build: Vec<String>,

    /// Output format: text, json
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl BuildPlanCommand {
    /// Execute the build-plan command
    pub fn execute(self, session: &Session, verbose: bool) -> Result<()> {
        let graph = session.resolve(&self.references, &self.build)?;
        let plan = BuildOrderPlanner::new(&graph).plan()?;

        if self.format == OutputFormat::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("Failed to serialize build plan")?
            );
            return Ok(());
        }

        if plan.batches.is_empty() {
            print_success("All binaries are available, nothing to build");
            return Ok(());
        }
        for (index, batch) in plan.batches.iter().enumerate() {
            println!("{}", style(format!("Batch {}", index + 1)).bold());
            for binary in batch {
                if verbose {
                    println!("  {} (node {})", binary.pref, binary.node);
                } else {
                    println!("  {}", binary.pref);
                }
            }
        }
        print_info(&format!(
            "{} package(s) to build: {}",
            plan.nodes_to_build.len(),
            plan.nodes_to_build.join(", ")
        ));
        Ok(())
    }
}
