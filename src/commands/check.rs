use anyhow::Result;

use crate::commands::{CommandReport, open_engine, report_batch};
use crate::warden::model::ExternalChange;

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// `kind:identifier` or a bare identifier.
    pub revert: Vec<String>,
    pub revert_all: bool,
    pub dismiss_all: bool,
}

fn matches_target(change: &ExternalChange, target: &str) -> bool {
    let target = target.trim();
    change.identifier == target || change.key().to_string() == target
}

pub fn run(opts: &CheckOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("check");
    if opts.revert_all && opts.dismiss_all {
        report.issue("invalid flags: use only one of --revert-all or --dismiss-all");
        return Ok(report);
    }

    let mut engine = open_engine()?;
    let changes = engine.detect_external_changes();
    report.detail(format!("external_changes={}", changes.len()));
    for change in &changes {
        report.detail(format!("external.{}={} -> {}", change.key(), change.old, change.new));
    }

    if opts.revert_all {
        let outcome = engine.revert_all()?;
        report_batch(&mut report, &outcome);
    } else {
        for target in &opts.revert {
            let Some(change) = engine
                .external_changes()
                .iter()
                .find(|change| {
                    matches_target(change, target)
                        || change.key() == engine.canonical_key(change.kind, target)
                })
                .cloned()
            else {
                report.issue(format!("no pending external change matches {target}"));
                continue;
            };
            match engine.revert_external_change(&change) {
                Ok(entry) => {
                    report.detail(format!("reverted.{}={}", change.key(), change.old));
                    if let Some(entry) = entry {
                        report.detail(format!("activity_entry={}", entry.id));
                    }
                }
                Err(err) => report.error_issue(&format!("revert {}", change.key()), &err),
            }
        }
        if opts.dismiss_all {
            engine.dismiss_all();
            report.detail("dismissed=all");
        }
    }

    for change in engine.external_changes() {
        report.issue(format!(
            "unreviewed external change {}: {} -> {} (kept as the new baseline)",
            change.key(),
            change.old,
            change.new
        ));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::model::{AssociationKind, HandlerRef};

    #[test]
    fn targets_match_bare_or_qualified_identifiers() {
        let change = ExternalChange {
            kind: AssociationKind::UrlScheme,
            identifier: "https".into(),
            old: HandlerRef::new("org.a", "AppA"),
            new: HandlerRef::new("org.b", "AppB"),
        };
        assert!(matches_target(&change, "https"));
        assert!(matches_target(&change, "url_scheme:https"));
        assert!(!matches_target(&change, "file_type:https"));
    }
}
