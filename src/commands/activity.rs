use anyhow::Result;

use crate::commands::{CommandReport, open_engine};
use crate::warden::util::truncate_with_ellipsis;

const SUMMARY_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub limit: Option<usize>,
}

pub fn run(opts: &ActivityOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("activity");
    let engine = open_engine()?;
    let limit = opts.limit.unwrap_or(usize::MAX);

    report.detail(format!("entries={}", engine.list_activity().len()));
    let mut shown = 0usize;
    for (bucket, entries) in engine.activity_groups() {
        if shown >= limit {
            break;
        }
        report.detail(format!("[{bucket}]"));
        for entry in entries.into_iter().take(limit - shown) {
            let marker = if engine.is_undoable(entry) {
                "undoable"
            } else {
                "final"
            };
            report.detail(format!(
                "{} {} {} {} {}",
                entry.id,
                entry.at_epoch_ms,
                entry.label(),
                marker,
                truncate_with_ellipsis(&entry.summary(), SUMMARY_MAX_CHARS)
            ));
            shown += 1;
        }
    }

    Ok(report)
}

pub fn run_clear() -> Result<CommandReport> {
    let mut report = CommandReport::new("clear-activity");
    let mut engine = open_engine()?;
    let removed = engine.clear_activity()?;
    report.detail(format!("removed={removed}"));
    Ok(report)
}
