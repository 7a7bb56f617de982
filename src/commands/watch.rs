use anyhow::Result;

use crate::commands::{CommandReport, report_batch};
use crate::warden::watcher;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    if opts.daemon {
        report.detail("starting warden watcher in daemon mode");
        watcher::run_daemon()?;
        return Ok(report);
    }

    let cycle = watcher::run_once()?;
    report.detail("warden watcher cycle completed");
    report.detail(format!("at_epoch_ms={}", cycle.at_epoch_ms));
    report.detail(format!("registry.backend={}", cycle.backend));
    report.detail(format!("poll_interval_secs={}", cycle.poll_interval_secs));
    report.detail(format!("auto_revert={}", cycle.auto_revert));
    report.detail(format!("external_changes={}", cycle.external_changes.len()));
    for change in &cycle.external_changes {
        report.detail(format!("external.{}={} -> {}", change.key(), change.old, change.new));
    }
    if let Some(reverted) = &cycle.reverted {
        report_batch(&mut report, reverted);
    }

    Ok(report)
}
