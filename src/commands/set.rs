use anyhow::Result;

use crate::commands::{CommandReport, open_engine};
use crate::warden::model::AssociationKind;

#[derive(Debug, Clone)]
pub struct SetOptions {
    pub kind: AssociationKind,
    pub identifier: String,
    pub handler: String,
    pub no_log: bool,
}

pub fn run(opts: &SetOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("set");
    let mut engine = open_engine()?;

    match engine.set_default(opts.kind, &opts.identifier, &opts.handler, opts.no_log) {
        Ok(Some(entry)) => {
            report.detail(format!("activity_entry={}", entry.id));
            report.detail(entry.summary());
            if let Some(message) = engine.toast().message() {
                report.detail(format!("undo_hint=warden undo {} ({message})", entry.id));
            }
        }
        Ok(None) if opts.no_log => {
            report.detail(format!(
                "{}:{} -> {} (not logged)",
                opts.kind, opts.identifier, opts.handler
            ));
        }
        Ok(None) => report.detail(format!(
            "{}:{} already uses {}",
            opts.kind, opts.identifier, opts.handler
        )),
        Err(err) => report.error_issue("set failed", &err),
    }

    Ok(report)
}
