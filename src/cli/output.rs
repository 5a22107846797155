//! Output formatting for CLI commands.
//!
//! Reports are rendered either as colored text with tables or as pretty
//! JSON for scripting.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::PlanSummary;
use crate::stack::{DriftReport, StackOutcome, StackPlan};
use crate::state::{LockInfo, StackState};
use crate::transaction::{Batch, ParentOperation};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct PlanOperationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Recorded collection row for table display.
#[derive(Tabled)]
struct CollectionRow {
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Order")]
    order: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a stack plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &StackPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &StackPlan) -> String {
        if !plan.has_changes() {
            return format!(
                "{} No changes required - stack '{}' is up to date.\n",
                "✓".green(),
                plan.stack
            );
        }

        let mut output = String::new();
        let _ = write!(output, "\nPlan for stack '{}'\n\n", plan.stack);

        let rows: Vec<PlanOperationRow> = Self::plan_rows(plan)
            .into_iter()
            .enumerate()
            .map(|(i, (target, operation, reason))| PlanOperationRow {
                index: i + 1,
                target,
                operation,
                reason,
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\n{}: {} parent change(s), {}\n",
            "Plan".bold(),
            plan.parent_operations().count(),
            Self::format_summary(&plan.summary)
        );
        output
    }

    /// Flattens a plan into (target, operation, reason) rows.
    fn plan_rows(plan: &StackPlan) -> Vec<(String, String, String)> {
        let mut rows = Vec::new();
        for batch in &plan.batches {
            match batch {
                Batch::Parent { operation } => {
                    let reason = match operation {
                        ParentOperation::Update { changed, .. } => changed.join(", "),
                        ParentOperation::Create { .. } => String::from("new"),
                        ParentOperation::Delete { .. } => String::from("not declared"),
                    };
                    rows.push((
                        operation.scope().to_string(),
                        Self::colorize_verb(operation.verb(), &operation.describe()),
                        reason,
                    ));
                }
                Batch::Collection {
                    scope,
                    kind,
                    plan,
                    best_effort,
                } => {
                    for op in plan {
                        let mut reason = op.reason().to_string();
                        if *best_effort {
                            reason.push_str(" (best effort)");
                        }
                        rows.push((
                            format!("{scope} {kind}"),
                            Self::colorize_verb(op.verb(), &op.describe(*kind)),
                            reason,
                        ));
                    }
                }
            }
        }
        rows
    }

    /// Formats the outcome of a lifecycle call.
    #[must_use]
    pub fn format_outcome(&self, verb: &str, outcome: &StackOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Stack '{}' {verb}\n\n",
                    "✓".green(),
                    outcome.state.stack
                );
                let _ = writeln!(output, "   Operations applied: {}", outcome.report.applied);
                if outcome.report.skipped > 0 {
                    let _ = writeln!(
                        output,
                        "   {} Operations skipped: {}",
                        "⚠".yellow(),
                        outcome.report.skipped
                    );
                }
                if let Some(txn) = &outcome.report.transaction_id {
                    let _ = writeln!(output, "   Transaction: {txn}");
                }
                let _ = writeln!(output, "   {}", Self::format_summary(&outcome.summary));
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
                let mut output = if report.has_drift() {
                    format!(
                        "{} Drift detected on stack '{}':\n",
                        "⚠".yellow(),
                        report.plan.stack
                    )
                } else {
                    format!("{} No drift detected - stack is converged.\n", "✓".green())
                };

                if report.config_changed {
                    let since = report
                        .last_applied_hash
                        .as_deref()
                        .map_or_else(|| String::from("never applied"), |h| short(h).to_string());
                    let _ = writeln!(output, "   Stack file changed since last apply ({since})");
                }

                if report.has_drift() {
                    output.push('\n');
                    for (target, operation, _) in Self::plan_rows(&report.plan) {
                        let _ = writeln!(output, "   - {target}: {operation}");
                    }
                }
                output
            }
        }
    }

    /// Formats stack state, as recorded or as read back.
    #[must_use]
    pub fn format_state(&self, state: &StackState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\nStack: {}\n\n", state.stack.bold());

                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Config hash: {}", short(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);

                if state.is_empty() {
                    output.push_str("   Nothing deployed.\n");
                } else {
                    let _ = writeln!(output, "   Parents: {}\n", state.parents.len());
                    let rows: Vec<CollectionRow> = state
                        .collections
                        .iter()
                        .map(|c| CollectionRow {
                            parent: c.scope.to_string(),
                            kind: c.kind.to_string(),
                            entries: c.entries.len(),
                            order: truncate(
                                &c.entries
                                    .iter()
                                    .map(|e| e.name.clone().unwrap_or_else(|| e.index.to_string()))
                                    .collect::<Vec<_>>()
                                    .join(", "),
                                40,
                            ),
                        })
                        .collect();
                    if !rows.is_empty() {
                        output.push_str(&Table::new(rows).to_string());
                        output.push('\n');
                    }
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success {
                            "✓".green()
                        } else {
                            "✗".red()
                        };
                        let detail = entry
                            .error
                            .clone()
                            .unwrap_or_else(|| entry.summary.to_string());
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({detail})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&lock).unwrap_or_default(),
            OutputFormat::Text => lock.map_or_else(
                || String::from("State is not locked.\n"),
                |info| {
                    let expiry = if info.is_expired() {
                        "expired".red().to_string()
                    } else {
                        format!("expires in {}s", info.remaining_secs())
                    };
                    format!(
                        "Locked by {} for {} ({})\n   Lock ID: {}\n",
                        info.holder, info.operation, expiry, info.lock_id
                    )
                },
            ),
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Stack file is valid.\n", "✓".green())
                } else {
                    format!(
                        "{} Stack file has {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    )
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }
                if show_warnings && result.warning_count() > 0 {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a one-line message.
    #[must_use]
    pub fn format_message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let marker = match status {
                    "error" => "✗".red(),
                    "warning" => "⚠".yellow(),
                    _ => "✓".green(),
                };
                format!("{marker} {message}")
            }
        }
    }

    fn format_summary(summary: &PlanSummary) -> String {
        format!(
            "{} to create, {} to update, {} to rename, {} to move, {} to delete, {} unchanged",
            summary.created.to_string().green(),
            summary.updated.to_string().yellow(),
            summary.renamed.to_string().yellow(),
            summary.moved.to_string().yellow(),
            summary.deleted.to_string().red(),
            summary.unchanged + summary.swapped
        )
    }

    fn colorize_verb(verb: &str, text: &str) -> String {
        match verb {
            "create" => format!("+{text}").green().to_string(),
            "delete" => format!("-{text}").red().to_string(),
            _ => format!("~{text}").yellow().to_string(),
        }
    }
}

/// First eight characters of a hash.
fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
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
