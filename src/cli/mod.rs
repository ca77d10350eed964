//! CLI module for the bundle deployment tool.
//!
//! Commands here work on the configuration tree and the state document
//! only; they never talk to remote services.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
