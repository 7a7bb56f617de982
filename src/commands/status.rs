use anyhow::Result;

use crate::commands::{CommandReport, open_engine};
use crate::env_loader;
use crate::warden::audit;
use crate::warden::config::resolve_config_path;
use crate::warden::snapshot::SnapshotStore;
use crate::warden::watcher;

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let engine = open_engine()?;
    let ctx = engine.context();
    let paths = &ctx.paths;

    report.detail(format!("warden_home={}", paths.warden_home.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("backups_dir={}", paths.backups_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    match resolve_config_path() {
        Some(path) => report.detail(format!(
            "config_path={} present={}",
            path.display(),
            path.exists()
        )),
        None => report.detail("config_path=none"),
    }
    report.detail(format!("registry.backend={}", engine.registry_backend()));
    report.detail(format!("display.timezone={}", ctx.config.display.timezone));
    report.detail(format!("watcher.auto_revert={}", ctx.config.watcher.auto_revert));

    match SnapshotStore::new(paths.snapshot_file()).load() {
        Ok(Some(snapshot)) => {
            report.detail(format!(
                "snapshot.taken_at_epoch_ms={}",
                snapshot.taken_at_epoch_ms
            ));
            report.detail(format!("snapshot.associations={}", snapshot.mapping.len()));
        }
        Ok(None) => report.detail("snapshot=none (next check records a baseline)"),
        Err(err) => report.error_issue("snapshot unreadable", &err),
    }

    let entries = engine.list_activity();
    let undoable = entries.iter().filter(|e| engine.is_undoable(e)).count();
    report.detail(format!("activity.entries={}", entries.len()));
    report.detail(format!("activity.undoable={undoable}"));

    match engine.list_backups() {
        Ok(backups) => report.detail(format!("backups={}", backups.len())),
        Err(err) => report.error_issue("backups unreadable", &err),
    }

    match audit::read_events(paths) {
        Ok(events) => {
            report.detail(format!("audit.events={}", events.len()));
            if let Some(last) = events.last() {
                report.detail(format!(
                    "audit.last={} {} at_epoch_secs={}",
                    last.phase, last.status, last.at_epoch_secs
                ));
            }
        }
        Err(err) => report.error_issue("audit log unreadable", &err),
    }

    let daemon_lock = watcher::daemon_lock_path(paths);
    report.detail(format!(
        "watch.daemon_lock={} present={}",
        daemon_lock.display(),
        daemon_lock.exists()
    ));

    for key in env_loader::unknown_warden_env_keys() {
        report.issue(format!("unknown environment variable {key} (not read by warden)"));
    }

    Ok(report)
}
