//! Terminal output for the command-line front-end.

use std::path::PathBuf;

use console::style;

use crate::domain::{ResolvedVersionMarker, VersionMarker};
use crate::store::GcReport;

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Print a marker identifier, or a dimmed notice when nothing matched
pub fn display_marker(marker: &VersionMarker) {
    if marker.is_valid() {
        println!("{}", style(marker.identifier()).cyan());
    } else {
        println!("{}", style("(none)").dim());
    }
}

pub fn display_resolved(resolved: &ResolvedVersionMarker) {
    println!(
        "{} {}",
        style(resolved.commit_hash()).yellow(),
        style(resolved.semantic_version()).green()
    );
}

/// List stored markers
pub fn display_stashes(markers: &[VersionMarker]) {
    if markers.is_empty() {
        println!("{}", style("No stashes stored").dim());
        return;
    }

    println!("{}", style(format!("{} stashes:", markers.len())).bold());
    for marker in markers {
        println!("  - {}", marker.identifier());
    }
}

pub fn display_entries(marker: &VersionMarker, entries: &[PathBuf]) {
    println!("{}", style(marker.identifier()).bold());
    for entry in entries {
        println!("  {}", entry.display());
    }
}

pub fn display_gc_report(report: &GcReport) {
    if report.locks_removed == 0 && report.transactions_removed == 0 {
        display_status("Nothing to collect");
    } else {
        display_success(&format!(
            "Removed {} locks and {} transactions",
            report.locks_removed, report.transactions_removed
        ));
    }

    if report.skipped > 0 {
        println!(
            "  {}",
            style(format!("{} transactions still in use", report.skipped)).dim()
        );
    }
}
