pub mod activity;
pub mod backup;
pub mod bulk_set;
pub mod check;
pub mod list;
pub mod set;
pub mod status;
pub mod undo;
pub mod update_check;
pub mod watch;

use anyhow::Result;
use serde::Serialize;

use crate::error::code_of;
use crate::registry::open_registry;
use crate::warden::engine::{BatchOutcome, Engine, WardenContext};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }

    /// Records a failure as an issue, prefixed with its error code when it
    /// carries one.
    pub fn error_issue(&mut self, context: &str, err: &anyhow::Error) {
        match code_of(err) {
            Some(code) => self.issue(format!("{context}: {} {err:#}", code.as_str())),
            None => self.issue(format!("{context}: {err:#}")),
        }
    }
}

pub fn open_engine() -> Result<Engine> {
    let ctx = WardenContext::from_env()?;
    let registry = open_registry(&ctx.config, &ctx.paths)?;
    Engine::open(ctx, registry)
}

pub fn report_batch(report: &mut CommandReport, outcome: &BatchOutcome) {
    if let Some(entry) = &outcome.entry {
        report.detail(format!("activity_entry={}", entry.id));
    }
    report.detail(format!("applied={}", outcome.applied.len()));
    for change in &outcome.applied {
        report.detail(format!(
            "applied.{}={} -> {}",
            change.key(),
            change.old.as_ref().map_or("none".to_string(), ToString::to_string),
            change.new.as_ref().map_or("none".to_string(), ToString::to_string),
        ));
    }
    for failed in &outcome.failed {
        match failed.code {
            Some(code) => report.issue(format!("{}: {code} {}", failed.key, failed.error)),
            None => report.issue(format!("{}: {}", failed.key, failed.error)),
        }
    }
}
