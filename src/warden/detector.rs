use crate::warden::activity::ActivityEntry;
use crate::warden::model::AssociationKey;
use crate::warden::snapshot::{HandlerMap, Snapshot};

/// A handler substitution seen between baseline and current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: AssociationKey,
    pub old_handler: String,
    pub new_handler: String,
}

/// Substitutions only: identifiers present on one side alone are ignored,
/// registries add and drop handlers on their own.
pub fn find_candidates(baseline: &HandlerMap, current: &HandlerMap) -> Vec<Candidate> {
    baseline
        .iter()
        .filter_map(|(key, old)| {
            let new = current.get(key)?;
            (new != old).then(|| Candidate {
                key: key.clone(),
                old_handler: old.clone(),
                new_handler: new.clone(),
            })
        })
        .collect()
}

/// Drops candidates explained by an entry recorded after the baseline was
/// taken (the snapshot write that should have covered it did not land).
pub fn without_self_inflicted<'a>(
    candidates: Vec<Candidate>,
    recent: impl IntoIterator<Item = &'a ActivityEntry> + Clone,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| {
            !recent
                .clone()
                .into_iter()
                .any(|entry| entry.records_change_to(&candidate.key, &candidate.new_handler))
        })
        .collect()
}

/// Candidates for `snapshot` against `current`, minus changes logged after
/// the snapshot. Entries are filtered by timestamp here as well, so callers
/// may pass the whole log.
pub fn detect<'a>(
    snapshot: &Snapshot,
    current: &HandlerMap,
    log: &'a [ActivityEntry],
) -> Vec<Candidate> {
    let candidates = find_candidates(&snapshot.mapping, current);
    if candidates.is_empty() {
        return candidates;
    }
    let baseline_at = snapshot.taken_at_epoch_ms;
    let recent: Vec<&'a ActivityEntry> = log
        .iter()
        .filter(|entry| entry.at_epoch_ms > baseline_at)
        .collect();
    without_self_inflicted(candidates, recent.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::activity::{ActivityAction, ChangeDetail};
    use crate::warden::model::{AssociationKind, HandlerRef};

    fn key(id: &str) -> AssociationKey {
        AssociationKey::new(AssociationKind::FileType, id)
    }

    fn map(pairs: &[(&str, &str)]) -> HandlerMap {
        pairs
            .iter()
            .map(|(id, handler)| (key(id), (*handler).to_string()))
            .collect()
    }

    fn set_entry(at: u64, identifier: &str, new: &str) -> ActivityEntry {
        ActivityEntry {
            id: format!("e{at}"),
            at_epoch_ms: at,
            action: ActivityAction::SetSingle(ChangeDetail {
                kind: AssociationKind::FileType,
                identifier: identifier.to_string(),
                old: Some(HandlerRef::new("AppA", "AppA")),
                new: Some(HandlerRef::new(new, new)),
            }),
        }
    }

    #[test]
    fn reports_substitutions_only() {
        let baseline = map(&[(".json", "AppA"), (".md", "AppX"), (".gone", "AppG")]);
        let current = map(&[(".json", "AppB"), (".md", "AppX"), (".new", "AppN")]);
        let found = find_candidates(&baseline, &current);
        assert_eq!(
            found,
            vec![Candidate {
                key: key(".json"),
                old_handler: "AppA".into(),
                new_handler: "AppB".into(),
            }]
        );
    }

    #[test]
    fn change_logged_after_baseline_is_suppressed() {
        let snapshot = Snapshot {
            taken_at_epoch_ms: 100,
            mapping: map(&[(".json", "AppA")]),
        };
        let current = map(&[(".json", "AppB")]);
        let log = vec![set_entry(150, ".json", "AppB")];
        assert!(detect(&snapshot, &current, &log).is_empty());
    }

    #[test]
    fn change_logged_before_baseline_does_not_suppress() {
        let snapshot = Snapshot {
            taken_at_epoch_ms: 100,
            mapping: map(&[(".json", "AppA")]),
        };
        let current = map(&[(".json", "AppB")]);
        let log = vec![set_entry(50, ".json", "AppB")];
        assert_eq!(detect(&snapshot, &current, &log).len(), 1);
    }

    #[test]
    fn suppression_requires_matching_new_handler() {
        let snapshot = Snapshot {
            taken_at_epoch_ms: 100,
            mapping: map(&[(".json", "AppA")]),
        };
        let current = map(&[(".json", "AppC")]);
        let log = vec![set_entry(150, ".json", "AppB")];
        assert_eq!(detect(&snapshot, &current, &log).len(), 1);
    }

    #[test]
    fn bulk_details_suppress_per_identifier() {
        let snapshot = Snapshot {
            taken_at_epoch_ms: 100,
            mapping: map(&[(".json", "AppA"), (".md", "AppA")]),
        };
        let current = map(&[(".json", "AppB"), (".md", "AppC")]);
        let bulk = ActivityEntry {
            id: "bulk".into(),
            at_epoch_ms: 120,
            action: ActivityAction::SetBulk {
                handler: Some(HandlerRef::new("AppB", "AppB")),
                details: vec![ChangeDetail {
                    kind: AssociationKind::FileType,
                    identifier: ".json".into(),
                    old: Some(HandlerRef::new("AppA", "AppA")),
                    new: Some(HandlerRef::new("AppB", "AppB")),
                }],
            },
        };
        let found = detect(&snapshot, &current, &[bulk]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, key(".md"));
    }
}
