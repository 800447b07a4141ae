//! CLI argument parsing using clap derive macros

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    build_order::BuildOrderCommand, build_plan::BuildPlanCommand, info::InfoCommand, Session,
};

/// pkggraph - dependency graph resolution and build ordering
///
/// Resolves the requirements of a package against a recipe index and prints
/// the resulting graph, its build order or its binary build plan.
#[derive(Parser, Debug)]
#[command(name = "pkggraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Recipe index file
    #[arg(long, global = true, env = "PKGGRAPH_INDEX", default_value = "recipes.toml")]
    pub index: PathBuf,

    /// Profile with options, build-require patterns and resolver settings
    #[arg(long, global = true, env = "PKGGRAPH_PROFILE")]
    pub profile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a graph and show every node by level
    Info(InfoCommand),

    /// Print the reference batches to rebuild for some targets
    BuildOrder(BuildOrderCommand),

    /// Print the binaries to build, leaf-first
    BuildPlan(BuildPlanCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        if self.no_color {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }

        let session = Session::load(&self.index, self.profile.as_deref())?;
        match self.command {
            Commands::Info(cmd) => cmd.execute(&session, self.verbose),
            Commands::BuildOrder(cmd) => cmd.execute(&session, self.verbose),
            Commands::BuildPlan(cmd) => cmd.execute(&session, self.verbose),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_order_targets() {
        let cli = Cli::parse_from([
            "pkggraph",
            "--index",
            "idx.toml",
            "build-order",
            "app/1.0",
            "--target",
            "liba",
            "--target",
            "libb",
        ]);
        assert_eq!(cli.index, PathBuf::from("idx.toml"));
        match cli.command {
            Commands::BuildOrder(cmd) => assert_eq!(cmd.target, vec!["liba", "libb"]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
