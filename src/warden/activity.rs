use crate::warden::model::{AssociationKey, AssociationKind, HandlerRef};
use crate::warden::util::write_json_atomic;
use anyhow::{Context, Result};
use chrono::TimeZone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static ENTRY_SEQ: AtomicU64 = AtomicU64::new(0);

/// One association's handler before and after a recorded change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetail {
    pub kind: AssociationKind,
    pub identifier: String,
    pub old: Option<HandlerRef>,
    pub new: Option<HandlerRef>,
}

impl ChangeDetail {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.kind, self.identifier.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityAction {
    SetSingle(ChangeDetail),
    SetBulk {
        /// `None` when the identifiers went to different handlers, as in a
        /// bulk undo.
        handler: Option<HandlerRef>,
        details: Vec<ChangeDetail>,
    },
    CreateBackup {
        backup_path: String,
        associations: usize,
    },
    Restore {
        backup_path: String,
        details: Vec<ChangeDetail>,
        failed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub at_epoch_ms: u64,
    pub action: ActivityAction,
}

impl ActivityEntry {
    pub fn can_undo(&self) -> bool {
        match &self.action {
            ActivityAction::SetSingle(detail) => detail.old.is_some(),
            ActivityAction::SetBulk { details, .. } => {
                !details.is_empty() && details.iter().any(|d| d.old.is_some())
            }
            ActivityAction::CreateBackup { .. } | ActivityAction::Restore { .. } => false,
        }
    }

    pub fn details(&self) -> &[ChangeDetail] {
        match &self.action {
            ActivityAction::SetSingle(detail) => std::slice::from_ref(detail),
            ActivityAction::SetBulk { details, .. } | ActivityAction::Restore { details, .. } => {
                details
            }
            ActivityAction::CreateBackup { .. } => &[],
        }
    }

    /// True when this entry moved `key` to `handler_id`.
    pub fn records_change_to(&self, key: &AssociationKey, handler_id: &str) -> bool {
        self.details().iter().any(|detail| {
            detail.kind == key.kind
                && detail.identifier == key.identifier
                && detail.new.as_ref().is_some_and(|new| new.id == handler_id)
        })
    }

    pub fn label(&self) -> &'static str {
        match &self.action {
            ActivityAction::SetSingle(_) => "set",
            ActivityAction::SetBulk { .. } => "bulk-set",
            ActivityAction::CreateBackup { .. } => "backup",
            ActivityAction::Restore { .. } => "restore",
        }
    }

    pub fn target(&self) -> String {
        match &self.action {
            ActivityAction::SetSingle(detail) => detail.key().to_string(),
            ActivityAction::SetBulk { details, .. } => format!("{} associations", details.len()),
            ActivityAction::CreateBackup { backup_path, .. } => backup_path.clone(),
            ActivityAction::Restore { backup_path, .. } => backup_path.clone(),
        }
    }

    pub fn summary(&self) -> String {
        fn name(handler: &Option<HandlerRef>) -> String {
            handler
                .as_ref()
                .map(|h| h.name.clone())
                .unwrap_or_else(|| "none".to_string())
        }

        match &self.action {
            ActivityAction::SetSingle(detail) => format!(
                "{}: {} -> {}",
                detail.key(),
                name(&detail.old),
                name(&detail.new)
            ),
            ActivityAction::SetBulk { handler, details } => match handler {
                Some(handler) => format!("{} associations -> {}", details.len(), handler.name),
                None => format!("{} associations reverted", details.len()),
            },
            ActivityAction::CreateBackup {
                backup_path,
                associations,
            } => format!("backup of {associations} associations at {backup_path}"),
            ActivityAction::Restore {
                backup_path,
                details,
                failed,
            } => format!(
                "restored {} associations from {backup_path} ({failed} failed)",
                details.len()
            ),
        }
    }
}

fn entry_id(at_epoch_ms: u64, action: &ActivityAction) -> String {
    let seq = ENTRY_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(at_epoch_ms.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    if let Ok(raw) = serde_json::to_vec(action) {
        hasher.update(raw);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_ms: u64,
    pub max_entries: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActivityFile {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    entries: Vec<ActivityEntry>,
    #[serde(default)]
    stale_ids: BTreeSet<String>,
}

/// Newest-first history of everything this tool changed.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    policy: RetentionPolicy,
    entries: Vec<ActivityEntry>,
    stale_ids: BTreeSet<String>,
}

impl ActivityLog {
    /// Loads and prunes; the pruned result is written back when anything was
    /// dropped.
    pub fn load(path: &Path, policy: RetentionPolicy, now_ms: u64) -> Result<Self> {
        let file = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<ActivityFile>(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            ActivityFile::default()
        };

        let mut log = Self {
            path: path.to_path_buf(),
            policy,
            entries: file.entries,
            stale_ids: file.stale_ids,
        };
        log.entries
            .sort_by(|a, b| b.at_epoch_ms.cmp(&a.at_epoch_ms));
        if log.prune(now_ms) > 0 {
            log.save()?;
        }
        Ok(log)
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ActivityEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn is_stale(&self, id: &str) -> bool {
        self.stale_ids.contains(id)
    }

    pub fn is_undoable(&self, entry: &ActivityEntry) -> bool {
        entry.can_undo() && !self.is_stale(&entry.id)
    }

    pub fn append(&mut self, action: ActivityAction, now_ms: u64) -> Result<ActivityEntry> {
        let entry = ActivityEntry {
            id: entry_id(now_ms, &action),
            at_epoch_ms: now_ms,
            action,
        };
        let at = self
            .entries
            .iter()
            .position(|existing| existing.at_epoch_ms <= now_ms)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry.clone());
        self.prune(now_ms);
        self.save()?;
        Ok(entry)
    }

    pub fn mark_stale(&mut self, id: &str) -> Result<()> {
        if self.stale_ids.insert(id.to_string()) {
            self.save()?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        self.stale_ids.clear();
        self.save()?;
        Ok(removed)
    }

    fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let cutoff = now_ms.saturating_sub(self.policy.max_age_ms);
        self.entries.retain(|entry| entry.at_epoch_ms >= cutoff);
        self.entries.truncate(self.policy.max_entries);

        let live: BTreeSet<&str> = self.entries.iter().map(|e| e.id.as_str()).collect();
        self.stale_ids.retain(|id| live.contains(id.as_str()));

        before - self.entries.len()
    }

    fn save(&self) -> Result<()> {
        let file = ActivityFile {
            schema_version: 1,
            entries: self.entries.clone(),
            stale_ids: self.stale_ids.clone(),
        };
        write_json_atomic(&self.path, &file)
    }
}

/// One step of a consolidated undo: put `key` back on `revert_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reversion {
    pub kind: AssociationKind,
    pub identifier: String,
    pub revert_to: HandlerRef,
}

impl Reversion {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.kind, self.identifier.clone())
    }
}

/// Minimal reversions returning every target in `entries` to its state
/// before the oldest of them. Input order does not matter.
pub fn consolidate<'a>(entries: impl IntoIterator<Item = &'a ActivityEntry>) -> Vec<Reversion> {
    let mut ordered: Vec<&ActivityEntry> = entries
        .into_iter()
        .filter(|entry| entry.can_undo())
        .collect();
    ordered.sort_by_key(|entry| entry.at_epoch_ms);

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in ordered {
        for detail in entry.details() {
            if !seen.insert(detail.key()) {
                continue;
            }
            // The oldest record decides: no prior handler means nothing to
            // return to.
            if let Some(old) = &detail.old {
                out.push(Reversion {
                    kind: detail.kind,
                    identifier: detail.identifier.clone(),
                    revert_to: old.clone(),
                });
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Today,
    Yesterday,
    ThisWeek,
    Earlier,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this-week",
            Self::Earlier => "earlier",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "this-week" | "week" => Ok(Self::ThisWeek),
            "earlier" | "older" => Ok(Self::Earlier),
            other => anyhow::bail!(
                "unknown activity group `{other}`; use today, yesterday, this-week or earlier"
            ),
        }
    }
}

pub fn bucket_for(at_epoch_ms: u64, now_epoch_ms: u64, tz: Tz) -> Bucket {
    let local_date = |ms: u64| {
        tz.timestamp_millis_opt(i64::try_from(ms).unwrap_or(i64::MAX))
            .single()
            .map(|dt| dt.date_naive())
    };
    let (Some(at), Some(today)) = (local_date(at_epoch_ms), local_date(now_epoch_ms)) else {
        return Bucket::Earlier;
    };
    match (today - at).num_days() {
        i64::MIN..=0 => Bucket::Today,
        1 => Bucket::Yesterday,
        2..=6 => Bucket::ThisWeek,
        _ => Bucket::Earlier,
    }
}

/// Groups newest-first entries by calendar bucket, preserving order.
pub fn group_by_bucket<'a>(
    entries: &'a [ActivityEntry],
    now_epoch_ms: u64,
    tz: Tz,
) -> Vec<(Bucket, Vec<&'a ActivityEntry>)> {
    let mut out: Vec<(Bucket, Vec<&ActivityEntry>)> = Vec::new();
    for entry in entries {
        let bucket = bucket_for(entry.at_epoch_ms, now_epoch_ms, tz);
        match out.iter_mut().find(|(b, _)| *b == bucket) {
            Some((_, group)) => group.push(entry),
            None => out.push((bucket, vec![entry])),
        }
    }
    out.sort_by_key(|(bucket, _)| *bucket);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    const NOW: u64 = 1_760_000_000_000;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            max_age_ms: 30 * DAY_MS,
            max_entries: 100,
        }
    }

    fn handler(id: &str) -> HandlerRef {
        HandlerRef::new(id, id.to_uppercase())
    }

    fn single(identifier: &str, old: Option<&str>, new: &str) -> ActivityAction {
        ActivityAction::SetSingle(ChangeDetail {
            kind: AssociationKind::FileType,
            identifier: identifier.to_string(),
            old: old.map(handler),
            new: Some(handler(new)),
        })
    }

    fn entry(at: u64, action: ActivityAction) -> ActivityEntry {
        ActivityEntry {
            id: entry_id(at, &action),
            at_epoch_ms: at,
            action,
        }
    }

    #[test]
    fn undo_requires_old_handler_and_non_empty_details() {
        assert!(entry(1, single("a", Some("x"), "y")).can_undo());
        assert!(!entry(1, single("a", None, "y")).can_undo());
        assert!(
            !entry(
                1,
                ActivityAction::SetBulk {
                    handler: Some(handler("y")),
                    details: Vec::new(),
                }
            )
            .can_undo()
        );
        assert!(
            !entry(
                1,
                ActivityAction::CreateBackup {
                    backup_path: "b.json".into(),
                    associations: 3,
                }
            )
            .can_undo()
        );
    }

    #[test]
    fn append_keeps_newest_first_and_persists() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("activity.json");
        let mut log = ActivityLog::load(&path, policy(), NOW).expect("load");
        let first = log.append(single("a", Some("x"), "y"), NOW).expect("first");
        let second = log.append(single("b", Some("p"), "q"), NOW + 1).expect("second");
        assert_ne!(first.id, second.id);
        assert_eq!(log.entries()[0].id, second.id);

        let reloaded = ActivityLog::load(&path, policy(), NOW + 2).expect("reload");
        let ids: Vec<&str> = reloaded.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[test]
    fn load_enforces_count_and_age_bounds() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("activity.json");
        let loose = RetentionPolicy {
            max_age_ms: u64::MAX,
            max_entries: usize::MAX,
        };
        let mut log = ActivityLog::load(&path, loose, NOW).expect("load");
        for i in 0..150u64 {
            log.append(single(&format!("f{i}"), Some("x"), "y"), NOW - 40 * DAY_MS + i * DAY_MS / 4)
                .expect("append");
        }
        assert_eq!(log.entries().len(), 150);

        let pruned = ActivityLog::load(&path, policy(), NOW).expect("reload");
        assert!(pruned.entries().len() <= 100);
        assert!(
            pruned
                .entries()
                .iter()
                .all(|e| NOW - e.at_epoch_ms <= 30 * DAY_MS)
        );

        let again = ActivityLog::load(&path, policy(), NOW).expect("persisted prune");
        assert_eq!(again.entries().len(), pruned.entries().len());
    }

    #[test]
    fn count_bound_keeps_the_newest() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("activity.json");
        let mut log = ActivityLog::load(&path, policy(), NOW).expect("load");
        for i in 0..150u64 {
            log.append(single(&format!("f{i}"), Some("x"), "y"), NOW + i)
                .expect("append");
        }
        assert_eq!(log.entries().len(), 100);
        assert_eq!(log.entries()[0].at_epoch_ms, NOW + 149);
        assert_eq!(log.entries()[99].at_epoch_ms, NOW + 50);
    }

    #[test]
    fn consolidate_keeps_oldest_original_per_target() {
        let a1 = entry(NOW, single("A", Some("X"), "Y"));
        let a2 = entry(NOW + 1, single("A", Some("Y"), "Z"));
        let b1 = entry(NOW + 2, single("B", Some("P"), "Q"));
        // newest-first, as the log hands them out
        let group = [&b1, &a2, &a1];

        let reversions = consolidate(group);
        assert_eq!(reversions.len(), 2);
        assert_eq!(reversions[0].identifier, "A");
        assert_eq!(reversions[0].revert_to.id, "X");
        assert_eq!(reversions[1].identifier, "B");
        assert_eq!(reversions[1].revert_to.id, "P");
    }

    #[test]
    fn consolidate_reads_bulk_details_and_skips_unknown_origin() {
        let bulk = entry(
            NOW,
            ActivityAction::SetBulk {
                handler: Some(handler("Z")),
                details: vec![
                    ChangeDetail {
                        kind: AssociationKind::FileType,
                        identifier: "A".into(),
                        old: Some(handler("X")),
                        new: Some(handler("Z")),
                    },
                    ChangeDetail {
                        kind: AssociationKind::FileType,
                        identifier: "C".into(),
                        old: None,
                        new: Some(handler("Z")),
                    },
                ],
            },
        );
        let later = entry(NOW + 5, single("C", Some("Z"), "W"));

        let reversions = consolidate([&later, &bulk]);
        assert_eq!(reversions.len(), 1);
        assert_eq!(reversions[0].key().identifier, "A");
    }

    #[test]
    fn stale_marks_survive_reload_and_block_undo() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("activity.json");
        let mut log = ActivityLog::load(&path, policy(), NOW).expect("load");
        let e = log.append(single("a", Some("x"), "y"), NOW).expect("append");
        log.mark_stale(&e.id).expect("stale");

        let reloaded = ActivityLog::load(&path, policy(), NOW).expect("reload");
        let got = reloaded.get(&e.id).expect("entry");
        assert!(got.can_undo());
        assert!(!reloaded.is_undoable(got));
    }

    #[test]
    fn buckets_follow_the_configured_calendar() {
        let tz: Tz = "UTC".parse().expect("tz");
        assert_eq!(bucket_for(NOW, NOW, tz), Bucket::Today);
        assert_eq!(bucket_for(NOW - DAY_MS, NOW, tz), Bucket::Yesterday);
        assert_eq!(bucket_for(NOW - 3 * DAY_MS, NOW, tz), Bucket::ThisWeek);
        assert_eq!(bucket_for(NOW - 10 * DAY_MS, NOW, tz), Bucket::Earlier);

        let entries = vec![
            entry(NOW, single("a", Some("x"), "y")),
            entry(NOW - 10 * DAY_MS, single("b", Some("x"), "y")),
            entry(NOW - 11 * DAY_MS, single("c", Some("x"), "y")),
        ];
        let groups = group_by_bucket(&entries, NOW, tz);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, Bucket::Today);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!("this_week".parse::<Bucket>().expect("parse"), Bucket::ThisWeek);
    }
}
