//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{BowtieConfig, ConfigHasher, ValidationResult};
use crate::planner::{ActionType, DeploymentPlan, DiffResult};
use crate::reconciler::{DriftReport, ReconciliationResult};
use crate::state::{DeploymentState, EntityKind, LockInfo};

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
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Managed entity row for table display.
#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

/// Severity of a one-line status message.
#[derive(Debug, Clone, Copy)]
pub enum MessageLevel {
    /// Operation completed.
    Success,
    /// Non-fatal problem.
    Warning,
    /// Operation failed.
    Error,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when emitting JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a plan, with field-level details when `diff` is given.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, diff: Option<&DiffResult>) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::new(plan, diff)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, diff),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan, diff: Option<&DiffResult>) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required, the controller matches the configuration.\n",
                "✓".green()
            );
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nPlan");
        let _ = write!(
            output,
            "   Config hash: {}\n\n",
            ConfigHasher::short_hash(&plan.config_hash)
        );

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                kind: a.kind.to_string(),
                name: a.name.clone(),
                reason: Self::truncate(&a.reason, 50),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if let Some(diff) = diff {
            output.push_str("\nDetailed changes:\n");
            for resource_diff in diff.actionable_diffs() {
                let _ = writeln!(output, "   {resource_diff}");
                for detail in &resource_diff.details {
                    let _ = writeln!(
                        output,
                        "      {}: {} -> {}",
                        detail.field,
                        detail.old_value.as_deref().unwrap_or("-").red(),
                        detail.new_value.as_deref().unwrap_or("-").green()
                    );
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} membership syncs, {} to delete\n",
            plan.count_of(ActionType::Create).to_string().green(),
            plan.count_of(ActionType::Update).to_string().yellow(),
            plan.count_of(ActionType::SyncMembership).to_string().yellow(),
            plan.count_of(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats a validation result with a summary of the configuration.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &BowtieConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.errors.is_empty(),
                "warnings": result.warnings,
                "sites": config.sites.len(),
                "dns": config.dns.len(),
                "dns_block_lists": config.dns_block_lists.len(),
                "groups": config.groups.len(),
                "resources": config.resources.len(),
                "resource_groups": config.resource_groups.len(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                let _ = write!(
                    output,
                    "\nDeclared: {} sites, {} DNS policies, {} DNS block lists, {} groups, {} resources, {} resource groups\n",
                    config.sites.len(),
                    config.dns.len(),
                    config.dns_block_lists.len(),
                    config.groups.len(),
                    config.resources.len(),
                    config.resource_groups.len()
                );
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!("{} No drift detected, state is converged.\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{}/{} entities differ from the configuration.\n",
                        report.drifted_resources.len(),
                        report.total_resources
                    );
                    output
                }
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats local state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState");
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(
                    output,
                    "   Config hash: {}",
                    ConfigHasher::short_hash(&state.config_hash)
                );
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Entities: {}\n", state.entity_count());

                let rows: Vec<EntityRow> = EntityKind::ALL
                    .iter()
                    .flat_map(|kind| state.records_of(*kind))
                    .map(|r| EntityRow {
                        kind: r.kind.to_string(),
                        name: r.name.clone(),
                        id: r.id.clone(),
                        hash: ConfigHasher::short_hash(&r.payload_hash).to_string(),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({} entities)",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.entities.len()
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(lock).unwrap_or_default(),
            OutputFormat::Text => format!(
                "Lock {} held by {} for {} ({}s remaining)\n",
                lock.lock_id,
                lock.holder,
                lock.operation,
                lock.remaining_secs()
            ),
        }
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, level: MessageLevel, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let status = match level {
                    MessageLevel::Success => "success",
                    MessageLevel::Warning => "warning",
                    MessageLevel::Error => "error",
                };
                serde_json::to_string_pretty(
                    &serde_json::json!({ "status": status, "message": message }),
                )
                .unwrap_or_default()
            }
            OutputFormat::Text => {
                let marker = match level {
                    MessageLevel::Success => "✓".green(),
                    MessageLevel::Warning => "⚠".yellow(),
                    MessageLevel::Error => "✗".red(),
                };
                format!("{marker} {message}")
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::SyncMembership => "~members".yellow().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
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
    updates: usize,
    deletes: usize,
    actions: Vec<ActionJson>,
}

#[derive(serde::Serialize)]
struct ActionJson {
    action_type: String,
    kind: String,
    name: String,
    id: String,
    reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<crate::planner::DiffDetail>,
}

impl PlanJson {
    fn new(plan: &DeploymentPlan, diff: Option<&DiffResult>) -> Self {
        Self {
            config_hash: plan.config_hash.clone(),
            action_count: plan.action_count(),
            creates: plan.count_of(ActionType::Create),
            updates: plan.count_of(ActionType::Update) + plan.count_of(ActionType::SyncMembership),
            deletes: plan.count_of(ActionType::Delete),
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    kind: a.kind.to_string(),
                    name: a.name.clone(),
                    id: a.id.clone(),
                    reason: a.reason.clone(),
                    details: diff
                        .and_then(|d| d.diffs.iter().find(|rd| rd.kind == a.kind && rd.name == a.name))
                        .map(|rd| rd.details.clone())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}
