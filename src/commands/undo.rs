use anyhow::Result;

use crate::commands::{CommandReport, open_engine, report_batch};
use crate::warden::activity::Bucket;

#[derive(Debug, Clone)]
pub struct UndoOptions {
    pub entry_id: String,
}

#[derive(Debug, Clone)]
pub struct UndoGroupOptions {
    pub bucket: Bucket,
}

pub fn run(opts: &UndoOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("undo");
    let mut engine = open_engine()?;
    match engine.undo(&opts.entry_id) {
        Ok(outcome) => report_batch(&mut report, &outcome),
        Err(err) => report.error_issue(&format!("undo {}", opts.entry_id), &err),
    }
    Ok(report)
}

pub fn run_group(opts: &UndoGroupOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("undo-group");
    let mut engine = open_engine()?;
    report.detail(format!("group={}", opts.bucket));
    let outcome = engine.undo_group(opts.bucket)?;
    if outcome.applied.is_empty() && outcome.failed.is_empty() {
        report.detail("nothing to undo");
        return Ok(report);
    }
    report_batch(&mut report, &outcome);
    Ok(report)
}
