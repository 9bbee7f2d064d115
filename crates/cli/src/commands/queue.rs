//! `queue` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use spillover_queue::{LogReport, QueueOptions, RawCodec, SpilloverQueue};

use super::load_config;
use crate::cli::{DrainArgs, QueueArgs, QueueCommand, QueueFileArgs, QueueOpenArgs};

/// Queue file report for JSON output
#[derive(Serialize)]
struct ReportInfo {
    path: String,
    healthy: bool,
    file_bytes: u64,
    records: usize,
    live_bytes: u64,
    consumed_bytes: u64,
    torn_tail_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corruption: Option<String>,
}

impl From<&LogReport> for ReportInfo {
    fn from(report: &LogReport) -> Self {
        Self {
            path: report.path.display().to_string(),
            healthy: report.is_healthy(),
            file_bytes: report.file_bytes,
            records: report.records,
            live_bytes: report.live_bytes,
            consumed_bytes: report.consumed_bytes,
            torn_tail_bytes: report.torn_tail_bytes,
            first_sequence: report.first_sequence,
            last_sequence: report.last_sequence,
            corruption: report.corruption.clone(),
        }
    }
}

/// Execute the `queue` command
pub fn run_queue(args: &QueueArgs) -> Result<()> {
    match &args.command {
        QueueCommand::Inspect(args) => inspect(args).map(|_| ()),
        QueueCommand::Verify(args) => verify(args),
        QueueCommand::Compact(args) => compact(args),
        QueueCommand::Drain(args) => drain(args),
    }
}

fn inspect(args: &QueueFileArgs) -> Result<LogReport> {
    info!(path = %args.path.display(), "Inspecting queue file");
    let report = spillover_queue::inspect(&args.path)
        .with_context(|| format!("Failed to inspect {}", args.path.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&ReportInfo::from(&report))
            .context("Failed to serialize queue report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn verify(args: &QueueFileArgs) -> Result<()> {
    let report = inspect(args)?;
    if report.is_healthy() {
        Ok(())
    } else {
        anyhow::bail!(
            "Queue file {} would be repaired on next open",
            report.path.display()
        )
    }
}

fn open_queue(args: &QueueOpenArgs) -> Result<SpilloverQueue<Vec<u8>, RawCodec>> {
    let config = load_config(args.config.as_deref())?;
    let mut options = QueueOptions::from(&config.queue);
    if let Some(base_dir) = &args.base_dir {
        options.base_dir = base_dir.clone();
    }
    let path: PathBuf = options.file_path(&args.name);
    SpilloverQueue::open(&args.name, options, RawCodec)
        .with_context(|| format!("Failed to open queue {}", path.display()))
}

fn compact(args: &QueueOpenArgs) -> Result<()> {
    let queue = open_queue(args)?;
    let before = queue.file_bytes();
    let reclaimed = queue.check_file_size().context("Compaction failed")?;
    info!(queue = %queue.name(), before, reclaimed, "Queue compacted");

    println!("✓ Compacted {}", queue.file_path().display());
    println!("  Entries: {}", queue.size());
    println!("  File size: {} -> {} bytes", before, queue.file_bytes());
    println!("  Reclaimed: {} bytes", reclaimed);
    Ok(())
}

fn drain(args: &DrainArgs) -> Result<()> {
    let queue = open_queue(&args.queue)?;
    let limit = if args.limit == 0 { usize::MAX } else { args.limit };

    let mut drained = 0usize;
    while drained < limit {
        let Some(entry) = queue.try_dequeue().context("Failed to read queue entry")? else {
            break;
        };
        drained += 1;
        let value = if args.text {
            match std::str::from_utf8(&entry.value) {
                Ok(text) => text.to_string(),
                Err(_) => format!("<{} bytes, not UTF-8>", entry.value.len()),
            }
        } else {
            format!("<{} bytes>", entry.value.len())
        };
        println!(
            "#{} key={} residency={} {}",
            entry.sequence,
            entry.key,
            entry.residency.as_str(),
            value
        );
    }

    info!(queue = %queue.name(), drained, remaining = queue.size(), "Queue drained");
    println!("\nDrained {} entries, {} remaining", drained, queue.size());
    Ok(())
}

fn print_report(report: &LogReport) {
    if report.is_healthy() {
        println!("✓ Queue file is healthy: {}", report.path.display());
    } else {
        println!("✗ Queue file needs repair: {}", report.path.display());
    }
    println!("\n  File size: {} bytes", report.file_bytes);
    println!("  Records: {}", report.records);
    println!("  Live bytes: {}", report.live_bytes);
    println!("  Consumed bytes: {}", report.consumed_bytes);
    if let (Some(first), Some(last)) = (report.first_sequence, report.last_sequence) {
        println!("  Sequences: {}..={}", first, last);
    }
    if report.torn_tail_bytes > 0 {
        println!("  Torn tail: {} bytes", report.torn_tail_bytes);
    }
    if let Some(ref corruption) = report.corruption {
        println!("  Corruption: {}", corruption);
    }
}
