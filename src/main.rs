//! pkggraph CLI - inspect dependency graphs and build orders
//!
//! ```text
//! recipes.toml + profile.toml → resolve → evaluate binaries → print
//! ```

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use pkggraph::utils::terminal::print_error;
use pkggraph::GraphError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<GraphError>() {
                Some(graph_error) => graph_error.display_with_hints(),
                None => print_error(&format!("{:#}", err)),
            }
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; `--verbose` raises the default level to debug
fn init_logging(verbose: bool) {
    let default_level = if verbose { "pkggraph=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
