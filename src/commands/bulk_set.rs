use anyhow::Result;

use crate::commands::{CommandReport, open_engine, report_batch};
use crate::warden::model::AssociationKind;

#[derive(Debug, Clone)]
pub struct BulkSetOptions {
    pub kind: AssociationKind,
    pub identifiers: Vec<String>,
    pub handler: String,
}

pub fn run(opts: &BulkSetOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("bulk-set");
    if opts.identifiers.is_empty() {
        report.issue("no identifiers given");
        return Ok(report);
    }

    let mut engine = open_engine()?;
    let outcome = engine.bulk_set_default(opts.kind, &opts.identifiers, &opts.handler)?;
    report.detail(format!("handler={}", engine.handler_ref(&opts.handler)));
    report_batch(&mut report, &outcome);
    Ok(report)
}
