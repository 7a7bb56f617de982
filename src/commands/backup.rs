use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_engine, report_batch};
use crate::warden::backup::load_backup;
use crate::warden::engine::Engine;

#[derive(Debug, Clone)]
pub enum BackupAction {
    Create,
    List,
    Preview { path: Option<PathBuf> },
    Restore { path: Option<PathBuf> },
}

/// Explicit path, or the newest backup on disk.
fn pick_backup(engine: &Engine, path: &Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = path {
        return Ok(Some(path.clone()));
    }
    Ok(engine.list_backups()?.into_iter().next().map(|b| b.path))
}

pub fn run(action: &BackupAction) -> Result<CommandReport> {
    match action {
        BackupAction::Create => create(),
        BackupAction::List => list(),
        BackupAction::Preview { path } => preview(path),
        BackupAction::Restore { path } => restore(path),
    }
}

fn create() -> Result<CommandReport> {
    let mut report = CommandReport::new("backup-create");
    let mut engine = open_engine()?;
    let (path, record) = engine.create_backup()?;
    report.detail(format!("path={}", path.display()));
    report.detail(format!("associations={}", record.len()));
    report.detail(format!("os_version={}", record.os_version));
    Ok(report)
}

fn list() -> Result<CommandReport> {
    let mut report = CommandReport::new("backup-list");
    let engine = open_engine()?;
    let backups = engine.list_backups()?;
    report.detail(format!("backups={}", backups.len()));
    for listing in backups {
        report.detail(format!(
            "{} created_at_epoch_ms={} associations={} os={}",
            listing.path.display(),
            listing.record.created_at_epoch_ms,
            listing.record.len(),
            listing.record.os_version
        ));
    }
    Ok(report)
}

fn preview(path: &Option<PathBuf>) -> Result<CommandReport> {
    let mut report = CommandReport::new("backup-preview");
    let mut engine = open_engine()?;
    let Some(path) = pick_backup(&engine, path)? else {
        report.issue("no backups found");
        return Ok(report);
    };
    let record = load_backup(&path)?;
    let diff = engine.preview_restore(&record);
    report.detail(format!("backup={}", path.display()));
    report.detail(format!("changes={}", diff.len()));
    for entry in diff {
        report.detail(format!(
            "{}: {} -> {}",
            entry.key(),
            entry
                .current_handler
                .as_deref()
                .map_or("none".to_string(), |id| engine.handler_ref(id).to_string()),
            engine.handler_ref(&entry.proposed_handler)
        ));
    }
    Ok(report)
}

fn restore(path: &Option<PathBuf>) -> Result<CommandReport> {
    let mut report = CommandReport::new("backup-restore");
    let mut engine = open_engine()?;
    let Some(path) = pick_backup(&engine, path)? else {
        report.issue("no backups found");
        return Ok(report);
    };
    let record = load_backup(&path)?;
    report.detail(format!("backup={}", path.display()));
    let outcome = engine.apply_restore(&record, &path.display().to_string())?;
    if outcome.applied.is_empty() && outcome.failed.is_empty() {
        report.detail("already matches backup");
        return Ok(report);
    }
    report_batch(&mut report, &outcome);
    Ok(report)
}
