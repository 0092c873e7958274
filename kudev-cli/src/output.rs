//! Terminal rendering: status tables and the watch-loop reporter.

use std::path::Path;

use colored::{ColoredString, Colorize};
use tabled::{settings::Style, Table, Tabled};

use kudev_core::{EventBatch, ObservedStatus, SourceDigest, StatusCode};
use kudev_daemon::{DaemonError, DeploySummary, Reporter};

#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "pod")]
    name: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "ready")]
    ready: String,
    #[tabled(rename = "restarts")]
    restarts: i32,
    #[tabled(rename = "last message")]
    message: String,
}

pub fn status_label(code: StatusCode) -> ColoredString {
    let label = code.to_string().to_uppercase();
    match code {
        StatusCode::Running => label.green().bold(),
        StatusCode::Pending => label.yellow().bold(),
        StatusCode::Degraded => label.yellow().bold(),
        StatusCode::Failed => label.red().bold(),
        StatusCode::Unknown => label.bright_black().bold(),
    }
}

pub fn print_status(status: &ObservedStatus) {
    println!(
        "{} {}/{}  {}  {}/{} ready  hash {}",
        "■".bold(),
        status.namespace,
        status.deployment_name,
        status_label(status.status_code),
        status.ready_replicas,
        status.desired_replicas,
        status.image_digest_label.as_deref().unwrap_or("-"),
    );
    println!("  {}", status.message);

    if status.pods.is_empty() {
        return;
    }
    let rows: Vec<PodRow> = status
        .pods
        .iter()
        .map(|pod| PodRow {
            name: pod.name.clone(),
            phase: pod.phase.clone(),
            ready: if pod.ready { "yes" } else { "no" }.to_string(),
            restarts: pod.restarts,
            message: pod.message.clone().unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub fn print_summary(summary: &DeploySummary) {
    println!(
        "{} deployed {} in {:.1}s",
        "✓".green().bold(),
        summary.image_ref.bold(),
        summary.elapsed.as_secs_f64(),
    );
    print_status(&summary.status);
}

/// Watch-loop progress on stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn watching(&self, root: &Path, digest: &SourceDigest) {
        println!(
            "{} watching {} (hash {}), Ctrl-C to stop",
            "●".cyan().bold(),
            root.display(),
            digest
        );
    }

    fn changes(&self, batch: &EventBatch) {
        let Some(first) = batch.first() else { return };
        let more = match batch.len() {
            1 => String::new(),
            n => format!(" (+{} more)", n - 1),
        };
        println!("{} {} {}{more}", "~".bright_black(), first.operation, first.path);
    }

    fn unchanged(&self, digest: &SourceDigest) {
        println!("{} content unchanged (hash {digest}), skipping", "=".bright_black());
    }

    fn rebuilding(&self, previous: Option<&SourceDigest>, next: &SourceDigest) {
        let previous = previous.map(SourceDigest::as_str).unwrap_or("none");
        println!("{} rebuilding {previous} → {next}", "↻".cyan().bold());
    }

    fn deployed(&self, summary: &DeploySummary) {
        print_summary(summary);
    }

    fn failed(&self, error: &DaemonError) {
        eprintln!("{} {error}", "✗".red().bold());
    }
}
