//! Terminal rendering for FerroRep CLI

use console::style;
use ferrorep_types::{
    JobStatus, PrivilegeMode, ProbeSignals, ReplicationRequest, ReplicationResult,
    ReplicationStatus, RunId,
};
use std::time::Duration;

/// Announce a run before it starts
pub fn display_run_banner(request: &ReplicationRequest, run_id: RunId, destination: &str) {
    println!(
        "{} Replicating {} into {}",
        style("→").green().bold(),
        style(request.source_root.display()).cyan(),
        style(destination).cyan()
    );
    println!("  Run: {}", style(run_id).dim());
    if request.incremental {
        println!("  Incremental: {}", style("yes").yellow());
    }
}

/// Print the terminal result of a run
pub fn display_result(result: &ReplicationResult) {
    println!();
    println!("{}", style("Replication Summary:").bold().underlined());
    println!("  Status: {}", status_style(result.status));
    println!("  Mode: {}", style(result.mode.label()).cyan());
    println!("  Files: {}", style(result.total_files).green());
    println!("  Copied: {}", style(result.processed_count).green());
    println!("  Verified: {}", style(result.verified_count).green());
    println!(
        "  Bytes: {}",
        style(format_bytes(result.bytes_copied)).green()
    );
    println!(
        "  Duration: {}",
        style(format_duration(result.elapsed)).blue()
    );
    let secs = result.elapsed.as_secs_f64();
    if secs > 0.0 && result.bytes_copied > 0 {
        println!(
            "  Transfer rate: {}",
            style(format!(
                "{:.2} MB/s",
                result.bytes_copied as f64 / secs / 1024.0 / 1024.0
            ))
            .blue()
        );
    }

    if !result.failures.is_empty() {
        println!(
            "  Failed items: {}",
            style(result.failures.len()).red().bold()
        );
        for failure in &result.failures {
            println!(
                "    {} {} {}",
                style("✗").red(),
                failure.item,
                style(&failure.reason).dim()
            );
        }
    }
}

fn status_style(status: ReplicationStatus) -> console::StyledObject<&'static str> {
    match status {
        ReplicationStatus::Success => style("success").green().bold(),
        ReplicationStatus::PartialSuccess => style("partial success").yellow().bold(),
        ReplicationStatus::Failed => style("failed").red().bold(),
        ReplicationStatus::Cancelled => style("cancelled").magenta().bold(),
    }
}

fn availability(available: bool) -> console::StyledObject<&'static str> {
    if available {
        style("available").green()
    } else {
        style("unavailable").red()
    }
}

/// Print probe signals and the mode a run would use
pub fn display_probe(signals: ProbeSignals, mode: Result<PrivilegeMode, String>) {
    println!("{}", style("Privilege Probe:").bold().underlined());
    println!("  Root shell: {}", availability(signals.root_available));
    println!(
        "  Privileged broker: {}",
        availability(signals.brokered_available)
    );
    match mode {
        Ok(mode) => println!("  Selected mode: {}", style(mode.label()).cyan().bold()),
        Err(reason) => display_error(&reason),
    }
}

/// Print what the status store knows about a run
pub fn display_status(run_id: RunId, status: &JobStatus) {
    println!(
        "{} {}",
        style("Run").bold().underlined(),
        style(run_id).bold().underlined()
    );
    match &status.last_update {
        Some(update) => {
            println!("  Phase: {}", style(update.phase).cyan());
            println!("  Mode: {}", style(update.mode.label()).cyan());
            println!(
                "  Progress: {}% ({}/{})",
                style(update.percent).green(),
                update.processed,
                update.total
            );
            if !update.current_item.is_empty() {
                println!("  Current item: {}", update.current_item);
            }
            println!("  Updated: {}", style(update.timestamp.to_rfc3339()).dim());
        }
        None => display_info("No progress has been published yet"),
    }
    if let Some(result) = &status.result {
        display_result(result);
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Display a warning message with proper formatting
pub fn display_warning(message: &str) {
    println!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an error message with proper formatting
pub fn display_error(message: &str) {
    println!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), style(message).blue());
}
