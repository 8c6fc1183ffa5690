//! Persistence layer.
//!
//! Appends one JSON line per account cycle to an audit journal and reads
//! the journal back. The ledger remains the source of truth for
//! portfolios and recommendations; the journal only records what each
//! cycle did.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::engine::gate::ExecutionOutcome;
use crate::engine::CycleReport;

/// Default journal path.
const DEFAULT_JOURNAL_FILE: &str = "advisor_journal.jsonl";

/// One journal line: the stage results of a cycle, rendered as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    pub analysis: String,
    pub persist_recommendation: String,
    pub execution: String,
    pub liquidity: String,
    pub persist_stake: String,
    pub trades_executed: usize,
    pub trades_failed: usize,
    pub has_failures: bool,
}

impl From<&CycleReport> for JournalEntry {
    fn from(report: &CycleReport) -> Self {
        let trades_executed = match report.execution.completed() {
            Some(ExecutionOutcome::Executed(exec)) => exec.executed.len(),
            _ => 0,
        };
        Self {
            timestamp: report.started_at,
            account_id: report.account_id.clone(),
            analysis: report.analysis.to_string(),
            persist_recommendation: report.persist_recommendation.to_string(),
            execution: report.execution.to_string(),
            liquidity: report.liquidity.to_string(),
            persist_stake: report.persist_stake.to_string(),
            trades_executed,
            trades_failed: report.failed_trades(),
            has_failures: report.has_failures(),
        }
    }
}

/// Append a cycle report to the journal.
pub fn append_journal(report: &CycleReport, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_JOURNAL_FILE);
    let entry = JournalEntry::from(report);
    let line = serde_json::to_string(&entry).context("Failed to serialise journal entry")?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open journal {path}"))?;
    writeln!(file, "{line}").with_context(|| format!("Failed to append to journal {path}"))?;

    debug!(path, account = %entry.account_id, "Journal entry appended");
    Ok(())
}

/// Read every entry from the journal, oldest first.
/// A missing file is an empty journal. Lines that fail to parse are
/// skipped with a warning.
pub fn load_journal(path: Option<&str>) -> Result<Vec<JournalEntry>> {
    let path = path.unwrap_or(DEFAULT_JOURNAL_FILE);

    if !Path::new(path).exists() {
        info!(path, "No journal found");
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal from {path}"))?;

    let mut entries = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path, line = lineno + 1, error = %e, "Skipping corrupt journal line"),
        }
    }

    info!(path, entries = entries.len(), "Journal loaded");
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
