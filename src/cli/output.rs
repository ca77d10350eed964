//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, ResourceNode, ValidationResult};
use crate::deployer::DeployReport;
use crate::graph::Graph;
use crate::planner::{ActionType, DeploymentPlan};
use crate::state::StateDocument;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// State entry row for table display.
#[derive(Tabled)]
struct StateEntryRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Dependency order row for table display.
#[derive(Tabled)]
struct GraphRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() && plan.is_complete() {
            return format!("{} No changes required - state is converged.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = write!(output, "\nDeployment Plan\n");
        let _ = write!(output, "   Config hash: {}\n\n", ConfigHasher::new().short_hash(&plan.config_hash));

        let rows: Vec<PlanActionRow> = plan
            .pending()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.node.to_string(),
                reason: Self::truncate(&a.reason, 40),
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to recreate, {} to delete\n",
            plan.count(ActionType::Create).to_string().green(),
            (plan.count(ActionType::Update) + plan.count(ActionType::UpdateWithId))
                .to_string()
                .yellow(),
            plan.count(ActionType::Recreate).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red()
        );

        if !plan.failures.is_empty() {
            let _ = write!(output, "\n{} Planning failures:\n", "✗".red());
            for failure in &plan.failures {
                let _ = writeln!(output, "   - {failure}");
            }
        }

        output
    }

    /// Formats the report of an apply run.
    #[must_use]
    pub fn format_report(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if report.success {
                    format!("{} Deployment successful", "✓".green())
                } else {
                    format!("{} Deployment failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", report.created);
                let _ = writeln!(output, "   Updated: {}", report.updated);
                let _ = writeln!(output, "   Recreated: {}", report.recreated);
                let _ = writeln!(output, "   Deleted: {}", report.deleted);
                let _ = writeln!(output, "   Unchanged: {}", report.unchanged);
                if report.skipped > 0 {
                    let _ = writeln!(output, "   Skipped: {}", report.skipped);
                }
                let _ = writeln!(output, "   State serial: {}", report.serial);

                if !report.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &report.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a summary of the state document.
    #[must_use]
    pub fn format_state(&self, state: &StateDocument) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&StateJson::from(state)).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(output, "\nState\n\n");
                let _ = writeln!(output, "   Version: {}", state.state_version);
                let _ = writeln!(output, "   Lineage: {}", state.lineage);
                let _ = writeln!(output, "   Serial: {}", state.serial);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated.format("%Y-%m-%d %H:%M:%S"));
                let _ = writeln!(output, "   Resources: {}", state.len());
                for (group, entries) in &state.resources {
                    let _ = writeln!(output, "     {group}: {}", entries.len());
                }
                output
            }
        }
    }

    /// Formats the recorded resources.
    #[must_use]
    pub fn format_entries(&self, state: &StateDocument) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&StateJson::from(state).resources).unwrap_or_default(),
            OutputFormat::Text => {
                if state.is_empty() {
                    return String::from("   No resources recorded.\n");
                }
                let rows: Vec<StateEntryRow> = state
                    .entries()
                    .map(|(node, entry)| StateEntryRow {
                        group: node.group,
                        key: node.key,
                        id: Self::truncate(&entry.id, 36),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats resources in dependency order.
    #[must_use]
    pub fn format_graph(&self, graph: &Graph<ResourceNode>, order: &[&ResourceNode]) -> String {
        let entries: Vec<GraphJson> = order
            .iter()
            .map(|node| GraphJson {
                resource: node.to_string(),
                depends_on: graph.dependencies(node).iter().map(ToString::to_string).collect(),
            })
            .collect();

        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&entries).unwrap_or_default(),
            OutputFormat::Text => {
                if entries.is_empty() {
                    return String::from("   No resources declared.\n");
                }
                let rows: Vec<GraphRow> = entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| GraphRow {
                        index: i + 1,
                        resource: e.resource,
                        depends_on: if e.depends_on.is_empty() {
                            String::from("-")
                        } else {
                            e.depends_on.join(", ")
                        },
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = ValidationJson {
                    valid: result.is_valid(),
                    errors: result
                        .errors
                        .iter()
                        .map(|e| ErrorJson {
                            field: e.field.clone(),
                            message: e.message.clone(),
                        })
                        .collect(),
                    warnings: if show_warnings { result.warnings.clone() } else { Vec::new() },
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!("{} Configuration has {} errors:\n", "✗".red(), result.errors.len())
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update | ActionType::UpdateWithId => "~update".yellow().to_string(),
            ActionType::Recreate => "-/+recreate".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::Noop | ActionType::Unset => action_type.to_string().dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    config_hash: String,
    action_count: usize,
    creates: usize,
    deletes: usize,
    complete: bool,
    actions: Vec<ActionJson>,
    failures: Vec<ErrorJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action_type: ActionType,
    resource: String,
    id: Option<String>,
    reason: String,
    changed_fields: Vec<String>,
}

#[derive(serde::Serialize)]
struct ErrorJson {
    field: String,
    message: String,
}

impl From<&DeploymentPlan> for PlanJson {
    fn from(plan: &DeploymentPlan) -> Self {
        Self {
            config_hash: plan.config_hash.clone(),
            action_count: plan.action_count(),
            creates: plan.count(ActionType::Create),
            deletes: plan.count(ActionType::Delete),
            complete: plan.is_complete(),
            actions: plan
                .pending()
                .map(|a| ActionJson {
                    action_type: a.action_type,
                    resource: a.node.to_string(),
                    id: a.id.clone(),
                    reason: a.reason.clone(),
                    changed_fields: a.changes.iter().map(|c| c.path.to_string()).collect(),
                })
                .collect(),
            failures: plan
                .failures
                .iter()
                .map(|f| ErrorJson {
                    field: f.node.clone(),
                    message: f.message.clone(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct StateJson {
    state_version: u32,
    lineage: String,
    serial: u64,
    last_updated: String,
    resources: Vec<EntryJson>,
}

#[derive(serde::Serialize)]
struct EntryJson {
    resource: String,
    id: String,
}

impl From<&StateDocument> for StateJson {
    fn from(state: &StateDocument) -> Self {
        Self {
            state_version: state.state_version,
            lineage: state.lineage.clone(),
            serial: state.serial,
            last_updated: state.last_updated.to_rfc3339(),
            resources: state
                .entries()
                .map(|(node, entry)| EntryJson {
                    resource: node.to_string(),
                    id: entry.id.clone(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct GraphJson {
    resource: String,
    depends_on: Vec<String>,
}

#[derive(serde::Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<ErrorJson>,
    warnings: Vec<String>,
}
