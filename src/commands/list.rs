use anyhow::Result;

use crate::commands::{CommandReport, open_engine};
use crate::warden::model::AssociationKind;

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub kind: Option<AssociationKind>,
}

pub fn run(opts: &ListOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("list");
    let mut engine = open_engine()?;

    let kinds: Vec<AssociationKind> = match opts.kind {
        Some(kind) => vec![kind],
        None => AssociationKind::all().to_vec(),
    };
    for kind in kinds {
        let associations = engine.load_associations(kind);
        report.detail(format!("{kind}.count={}", associations.len()));
        for association in associations {
            let current = association
                .current_handler
                .as_deref()
                .map_or("none".to_string(), |id| engine.handler_ref(id).to_string());
            report.detail(format!(
                "{} handler={} available={}",
                association.key(),
                current,
                association.available_handlers.join(",")
            ));
        }
    }

    Ok(report)
}
