//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::STATE_PATH_ENV;

/// Bundle deploy - inspect resource bundles and their deployment state.
#[derive(Parser, Debug)]
#[command(name = "bundle-deploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "BUNDLE_DEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the state document.
    #[arg(long, global = true, env = STATE_PATH_ENV)]
    pub state: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the bundle configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Print the resource dependency order.
    Graph,

    /// Inspect or edit the deployment state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show a summary of the state document.
    Show,

    /// List recorded resources.
    List,

    /// Drop a resource from state without touching the remote side.
    Forget {
        /// Resource as `group.key`.
        resource: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_forget() {
        let cli = Cli::try_parse_from(["bundle-deploy", "--output", "json", "state", "forget", "jobs.etl"])
            .expect("valid arguments");
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::State {
                command: StateCommands::Forget { resource },
            } => assert_eq!(resource, "jobs.etl"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bundle-deploy", "graph", "--verbose", "--log-json"]).expect("valid arguments");
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Graph));
    }
}
