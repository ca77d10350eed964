//! Bundle deploy CLI entrypoint.
//!
//! This is the main entrypoint for the bundle-deploy command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bundle_deploy::cli::{Cli, Commands, OutputFormatter, StateCommands};
use bundle_deploy::config::{ConfigParser, ConfigTree, ConfigValidator, DeploySettings, ResourceNode, find_config_file};
use bundle_deploy::error::{ConfigError, Result, StateError};
use bundle_deploy::planner::build_dependency_graph;
use bundle_deploy::state::{DeploymentState, LocalStateStore, StateStore};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Graph => cmd_graph(cli.config.as_ref(), &formatter),
        Commands::State { command } => cmd_state(cli.state.as_ref(), command, &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let (config_file, tree) = load_config(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let result = ConfigValidator::new().check(&tree);
    emit(&formatter.format_validation(&result, show_warnings));

    if result.is_valid() {
        let count = tree.resource_nodes().len();
        info!("{count} resources declared");
        Ok(())
    } else {
        Err(ConfigError::validation_general(format!("{} validation errors", result.errors.len())).into())
    }
}

/// Print resources in dependency order.
fn cmd_graph(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (_, tree) = load_config(config_path)?;
    ConfigValidator::new().validate(&tree)?;

    let graph = build_dependency_graph(&tree)?;
    let order = graph.topological_order()?;
    debug!("Dependency graph has {} resources", graph.len());

    emit(&formatter.format_graph(&graph, &order));
    Ok(())
}

/// State management commands.
async fn cmd_state(state_path: Option<&PathBuf>, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let settings = load_settings(state_path)?;

    match command {
        StateCommands::Show | StateCommands::List => {
            let store = LocalStateStore::with_state_path(&settings.state_path);
            let Some(document) = store.load().await? else {
                eprintln!("No state found at {}.", store.location());
                return Ok(());
            };
            let output = if matches!(command, StateCommands::Show) {
                formatter.format_state(&document)
            } else {
                formatter.format_entries(&document)
            };
            emit(&output);
        }
        StateCommands::Forget { resource } => {
            let node = ResourceNode::parse(&resource).ok_or_else(|| {
                ConfigError::validation(format!("expected <group>.<key>, got '{resource}'"), "resource")
            })?;

            let state = DeploymentState::new();
            state.open(&settings.state_path).await?;
            let removed = state.delete_state(&node);
            state.finalize().await?;

            match removed {
                Some(entry) => eprintln!("Forgot {node} (ID: {}). The remote resource was not touched.", entry.id),
                None => return Err(StateError::NotFound { node: node.to_string() }.into()),
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` next to the configuration and parses the tree.
fn load_config(config_path: Option<&PathBuf>) -> Result<(PathBuf, ConfigTree)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    let tree = parser.load_file(&config_file)?;
    Ok((config_file, tree))
}

/// Reads settings from the environment, with the CLI state path taking precedence.
fn load_settings(state_path: Option<&PathBuf>) -> Result<DeploySettings> {
    ConfigParser::new().load_dotenv()?;
    let settings = DeploySettings::from_env()?;
    Ok(match state_path {
        Some(path) => settings.with_state_path(path),
        None => settings,
    })
}

/// Writes command output to stdout.
fn emit(output: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(output.as_bytes());
    if !output.ends_with('\n') {
        let _ = stdout.write_all(b"\n");
    }
}
