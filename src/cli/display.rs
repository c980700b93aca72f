//! Terminal rendering for resolutions and diagnostics
//!
//! Resolutions go to stdout so they can be piped; warnings and errors go
//! to stderr.

use std::path::Path;

use colored::Colorize;

use crate::command::Command;
use crate::discover::DiscoveryReport;
use crate::doctor::{DiagnosticReport, Severity};
use crate::error::AzpermError;
use crate::resolve::{Confidence, Resolution};

/// Width of the separator printed after each resolution
const SEPARATOR_WIDTH: usize = 70;

/// `--name vm1 --yes`, keys in sorted order. `None` when there are no
/// parameters.
#[must_use]
pub fn format_parameters(cmd: &Command) -> Option<String> {
    if cmd.parameters().is_empty() {
        return None;
    }
    let rendered: Vec<String> = cmd
        .parameters()
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                format!("--{key}")
            } else {
                format!("--{key} {value}")
            }
        })
        .collect();
    Some(rendered.join(" "))
}

/// Permissions section header for a confidence level
#[must_use]
pub fn confidence_header(confidence: Confidence) -> String {
    let text = format!(
        "🔐 Required RBAC Permissions ({confidence} confidence - {}):",
        confidence.description()
    );
    match confidence {
        Confidence::High => text.green().bold().to_string(),
        Confidence::Medium => text.blue().bold().to_string(),
        Confidence::Low => text.yellow().bold().to_string(),
    }
}

/// Full block printed for one resolved command
#[must_use]
pub fn render_resolution(cmd: &Command, resolution: &Resolution) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        format!("🔍 Command: {}", cmd.full_command()).cyan().bold()
    ));
    if let Some(params) = format_parameters(cmd) {
        out.push_str(&format!("📋 Parameters: {params}\n"));
    }
    out.push('\n');
    out.push_str(&confidence_header(resolution.confidence()));
    out.push('\n');

    // BTreeSet iteration is already sorted
    for permission in &resolution.permissions {
        out.push_str(&format!("  • {permission}\n"));
    }

    if resolution.confidence() == Confidence::Low {
        out.push('\n');
        out.push_str(&format!(
            "{}\n",
            "💡 Tip: log in with 'az login' (and drop --offline) for verified results"
                .yellow()
        ));
    }

    out.push('\n');
    out.push_str(&"─".repeat(SEPARATOR_WIDTH).dimmed().to_string());
    out.push('\n');
    out
}

/// Print a resolution to stdout
pub fn print_resolution(cmd: &Command, resolution: &Resolution) {
    println!("{}", render_resolution(cmd, resolution));
}

/// Follow-up advice printed under an error, if any
#[must_use]
pub const fn error_hint(err: &AzpermError) -> Option<&'static str> {
    match err {
        AzpermError::ResolutionEmpty { .. } => {
            Some("The service may be unmapped; check the command or log in with 'az login'.")
        }
        AzpermError::Parse { .. } => Some("Expected: az <service> <operation> [--param value ...]"),
        _ => None,
    }
}

/// Report an error for one input line
pub fn print_error(err: &AzpermError) {
    eprintln!("{} {}", "✗".red().bold(), err.to_string().red());
    if let Some(hint) = error_hint(err) {
        eprintln!("  {}", hint.dimmed());
    }
}

/// Render the summary of a discovery run
#[must_use]
pub fn render_discovery(report: &DiscoveryReport, saved_to: Option<&Path>) -> String {
    let mut out = format!("🔍 Discovered {} Azure CLI commands\n", report.discovered);
    out.push_str(&format!(
        "{}\n",
        format!(
            "✅ Mapped {} commands ({} verified against the live catalog)",
            report.mapped(),
            report.verified
        )
        .green()
    ));
    if !report.skipped_groups.is_empty() {
        out.push_str(&format!(
            "{}\n",
            format!(
                "⚠ Skipped {} groups: {}",
                report.skipped_groups.len(),
                report.skipped_groups.join(", ")
            )
            .yellow()
        ));
    }
    if let Some(path) = saved_to {
        out.push_str(&format!("💾 Saved to {}\n", path.display()));
    }
    out
}

/// Render a doctor report
#[must_use]
pub fn render_diagnostic_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "azperm doctor".bold().cyan()));
    out.push_str(&format!("{}\n", "─".repeat(50).dimmed()));

    for finding in &report.findings {
        let marker = match finding.severity {
            Severity::Error => "✗".red().bold(),
            Severity::Warning => "⚠".yellow().bold(),
            Severity::Info => "•".blue(),
        };
        out.push_str(&format!(
            "  {marker} [{}] {}\n",
            finding.code.dimmed(),
            finding.message
        ));
        if let Some(suggestion) = &finding.suggestion {
            out.push_str(&format!("      {}\n", suggestion.dimmed()));
        }
    }

    out.push_str(&format!("{}\n", "─".repeat(50).dimmed()));
    let summary = format!(
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
    if report.error_count() > 0 {
        out.push_str(&format!("  {}\n", summary.red().bold()));
    } else {
        out.push_str(&format!("  {}\n", summary.green().bold()));
    }
    out
}
