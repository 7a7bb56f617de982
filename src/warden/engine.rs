use crate::error::{WardenError, code_of};
use crate::registry::HandlerRegistry;
use crate::warden::activity::{
    self, ActivityAction, ActivityEntry, ActivityLog, Bucket, ChangeDetail, RetentionPolicy,
};
use crate::warden::audit;
use crate::warden::backup::{self, BackupListing, BackupRecord, DiffEntry};
use crate::warden::catalog::{AssociationCatalog, ReadFailure};
use crate::warden::config::{WardenConfig, load_config};
use crate::warden::detector;
use crate::warden::model::{
    Association, AssociationKey, AssociationKind, ExternalChange, HandlerRef,
};
use crate::warden::paths::{WardenPaths, resolve_paths};
use crate::warden::snapshot::{HandlerMap, SnapshotStore};
use crate::warden::toast::{ToastAction, UndoToast};
use crate::warden::util::{Clock, SystemClock};
use crate::warden::warn;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything an engine session needs that is not engine state.
#[derive(Clone)]
pub struct WardenContext {
    pub paths: WardenPaths,
    pub config: WardenConfig,
    pub clock: Arc<dyn Clock>,
}

impl WardenContext {
    pub fn new(paths: WardenPaths, config: WardenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            paths,
            config,
            clock,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            resolve_paths()?,
            load_config()?,
            Arc::new(SystemClock),
        ))
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedChange {
    pub key: AssociationKey,
    pub error: String,
    pub code: Option<&'static str>,
}

impl FailedChange {
    fn from_error(key: AssociationKey, err: &anyhow::Error) -> Self {
        Self {
            key,
            error: format!("{err:#}"),
            code: code_of(err).map(|code| code.as_str()),
        }
    }
}

/// Partial result of any operation touching several identifiers. Failures
/// never stop the rest of the batch and nothing is rolled back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub applied: Vec<ChangeDetail>,
    pub failed: Vec<FailedChange>,
    pub entry: Option<ActivityEntry>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub type RestoreResult = BatchOutcome;

fn acquire_session_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        return Err(WardenError::Locked(path.display().to_string()).into());
    }
    Ok(file)
}

/// The reconciliation and undo engine: sole owner of catalog, baseline,
/// history and the pending external changes for one session.
pub struct Engine {
    ctx: WardenContext,
    registry: Box<dyn HandlerRegistry>,
    catalog: AssociationCatalog,
    snapshots: SnapshotStore,
    activity: ActivityLog,
    external_changes: Vec<ExternalChange>,
    detection_done: bool,
    toast: UndoToast,
    tz: Tz,
    _session_lock: File,
}

impl Engine {
    pub fn open(ctx: WardenContext, registry: Box<dyn HandlerRegistry>) -> Result<Self> {
        let session_lock = acquire_session_lock(&ctx.paths.session_lock_file())?;
        let tz = ctx.config.display.timezone.parse::<Tz>().map_err(|_| {
            WardenError::InvalidConfig(format!(
                "unknown timezone {}",
                ctx.config.display.timezone
            ))
        })?;
        let policy = RetentionPolicy {
            max_age_ms: ctx.config.activity.retention_ms(),
            max_entries: ctx.config.activity.max_entries,
        };
        let activity = ActivityLog::load(&ctx.paths.activity_file(), policy, ctx.now_ms())?;
        let snapshots = SnapshotStore::new(ctx.paths.snapshot_file());

        Ok(Self {
            ctx,
            registry,
            catalog: AssociationCatalog::default(),
            snapshots,
            activity,
            external_changes: Vec::new(),
            detection_done: false,
            toast: UndoToast::Idle,
            tz,
            _session_lock: session_lock,
        })
    }

    pub fn context(&self) -> &WardenContext {
        &self.ctx
    }

    pub fn registry_backend(&self) -> &'static str {
        self.registry.backend()
    }

    #[cfg(test)]
    pub fn registry_mut(&mut self) -> &mut dyn HandlerRegistry {
        self.registry.as_mut()
    }

    pub fn handler_ref(&self, handler_id: &str) -> HandlerRef {
        HandlerRef::new(handler_id, self.registry.handler_name(handler_id))
    }

    fn report_read_failures(&self, stage: &str, failures: &[ReadFailure]) {
        for failure in failures {
            warn::emit(
                "REGISTRY_READ_FAILED",
                stage,
                "read",
                &failure.key.to_string(),
                "association skipped",
                &failure.error,
            );
        }
    }

    fn refresh_kinds(&mut self, kinds: &[AssociationKind]) {
        let failures = self.catalog.refresh(
            self.registry.as_ref(),
            &self.ctx.config.tracking,
            kinds,
        );
        self.report_read_failures("catalog", &failures);
    }

    fn ensure_loaded(&mut self) {
        let missing: Vec<AssociationKind> = AssociationKind::all()
            .iter()
            .copied()
            .filter(|kind| !self.catalog.is_loaded(*kind))
            .collect();
        if !missing.is_empty() {
            self.refresh_kinds(&missing);
        }
    }

    /// Manual reload. Never re-runs detection.
    pub fn refresh(&mut self) {
        self.refresh_kinds(AssociationKind::all());
    }

    pub fn load_associations(&mut self, kind: AssociationKind) -> Vec<Association> {
        self.refresh_kinds(&[kind]);
        self.catalog.list(kind)
    }

    /// Key under the registry's own spelling of `identifier`, so aliases
    /// such as an extension and its MIME type land on one association.
    pub fn canonical_key(&self, kind: AssociationKind, identifier: &str) -> AssociationKey {
        AssociationKey::new(kind, self.registry.canonical_identifier(kind, identifier))
    }

    fn read_current(&mut self, key: &AssociationKey) -> Result<Option<String>> {
        let association = self.catalog.refresh_one(self.registry.as_ref(), key)?;
        Ok(association.current_handler.clone())
    }

    fn apply_set(&mut self, key: &AssociationKey, handler_id: &str) -> Result<()> {
        self.registry
            .set_handler(key.kind, &key.identifier, handler_id)?;
        self.catalog.apply_set(key, handler_id);
        Ok(())
    }

    fn audit(&self, phase: &str, status: &str, message: &str) {
        audit::record(&self.ctx.paths, self.ctx.now_ms(), phase, status, message);
    }

    fn append(&mut self, action: ActivityAction) -> Result<ActivityEntry> {
        let entry = self.activity.append(action, self.ctx.now_ms())?;
        self.audit(entry.label(), "ok", &entry.summary());
        if self.activity.is_undoable(&entry) {
            let hold_ms = self.ctx.config.display.toast_secs.saturating_mul(1000);
            self.toast.arm(
                entry.summary(),
                ToastAction::UndoEntry(entry.id.clone()),
                self.ctx.now_ms(),
                hold_ms,
            );
        }
        Ok(entry)
    }

    /// Rewrites the baseline after a mutation so it is never reported as
    /// external. Before this session's detection has run, only the touched
    /// keys are patched and the old timestamp is kept: the rest of the old
    /// baseline still has to be compared, and every entry logged since it
    /// was taken still counts for suppression.
    fn persist_baseline(&mut self, touched: &[AssociationKey]) {
        let now = self.ctx.now_ms();
        let result = match (self.detection_done, self.snapshots.load()) {
            (false, Ok(Some(existing))) => {
                let taken_at = existing.taken_at_epoch_ms;
                let mut mapping = existing.mapping;
                for key in touched {
                    match self.catalog.current_handler(key) {
                        Some(handler) => {
                            mapping.insert(key.clone(), handler.to_string());
                        }
                        None => {
                            mapping.remove(key);
                        }
                    }
                }
                self.snapshots.save(&mapping, taken_at)
            }
            _ => {
                self.ensure_loaded();
                self.snapshots.save(&self.catalog.handler_map(), now)
            }
        };
        if let Err(err) = result {
            warn::emit(
                "SNAPSHOT_WRITE_FAILED",
                "baseline",
                "save",
                &self.snapshots.path().display().to_string(),
                "activity log will cover the change",
                &format!("{err:#}"),
            );
        }
    }

    /// Sets one default. Returns the logged entry, or `None` when nothing
    /// was logged (already set, or `skip_log`).
    pub fn set_default(
        &mut self,
        kind: AssociationKind,
        identifier: &str,
        handler_id: &str,
        skip_log: bool,
    ) -> Result<Option<ActivityEntry>> {
        let key = self.canonical_key(kind, identifier);
        let old = self.read_current(&key)?;
        if old.as_deref() == Some(handler_id) {
            return Ok(None);
        }

        if let Err(err) = self.apply_set(&key, handler_id) {
            self.audit("set", "failed", &format!("{key}: {err:#}"));
            return Err(err);
        }

        let entry = if skip_log {
            None
        } else {
            let detail = ChangeDetail {
                kind,
                identifier: key.identifier.clone(),
                old: old.as_deref().map(|id| self.handler_ref(id)),
                new: Some(self.handler_ref(handler_id)),
            };
            Some(self.append(ActivityAction::SetSingle(detail))?)
        };
        self.persist_baseline(&[key]);
        Ok(entry)
    }

    pub fn bulk_set_default(
        &mut self,
        kind: AssociationKind,
        identifiers: &[String],
        handler_id: &str,
    ) -> Result<BatchOutcome> {
        let handler = self.handler_ref(handler_id);
        let mut outcome = BatchOutcome::default();
        let mut touched = Vec::new();

        for identifier in identifiers {
            let key = self.canonical_key(kind, identifier);
            let old = match self.read_current(&key) {
                Ok(old) => old,
                Err(err) => {
                    outcome.failed.push(FailedChange::from_error(key, &err));
                    continue;
                }
            };
            if old.as_deref() == Some(handler_id) {
                continue;
            }
            match self.apply_set(&key, handler_id) {
                Ok(()) => {
                    outcome.applied.push(ChangeDetail {
                        kind,
                        identifier: key.identifier.clone(),
                        old: old.as_deref().map(|id| self.handler_ref(id)),
                        new: Some(handler.clone()),
                    });
                    touched.push(key);
                }
                Err(err) => outcome.failed.push(FailedChange::from_error(key, &err)),
            }
        }

        if !outcome.applied.is_empty() {
            outcome.entry = Some(self.append(ActivityAction::SetBulk {
                handler: Some(handler),
                details: outcome.applied.clone(),
            })?);
            self.persist_baseline(&touched);
        }
        Ok(outcome)
    }

    /// Compares the registry with the stored baseline. Runs once per session;
    /// later calls return nothing. Never fails: problems degrade to "no
    /// changes".
    pub fn detect_external_changes(&mut self) -> Vec<ExternalChange> {
        if self.detection_done {
            return Vec::new();
        }
        self.refresh();
        let current = self.catalog.handler_map();
        let now = self.ctx.now_ms();

        let baseline = match self.snapshots.load() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn::emit(
                    "SNAPSHOT_CORRUPT",
                    "detect",
                    "load",
                    &self.snapshots.path().display().to_string(),
                    "treated as first run",
                    &format!("{err:#}"),
                );
                None
            }
        };

        let changes: Vec<ExternalChange> = match &baseline {
            None => Vec::new(),
            Some(snapshot) => detector::detect(snapshot, &current, self.activity.entries())
                .into_iter()
                .map(|candidate| ExternalChange {
                    kind: candidate.key.kind,
                    identifier: candidate.key.identifier.clone(),
                    old: self.handler_ref(&candidate.old_handler),
                    new: self.handler_ref(&candidate.new_handler),
                })
                .collect(),
        };

        self.detection_done = true;
        if let Err(err) = self.snapshots.save(&current, now) {
            warn::emit(
                "SNAPSHOT_WRITE_FAILED",
                "detect",
                "save",
                &self.snapshots.path().display().to_string(),
                "baseline not advanced",
                &format!("{err:#}"),
            );
        }
        self.audit(
            "detect",
            if baseline.is_some() { "ok" } else { "baseline-created" },
            &format!("{} external changes", changes.len()),
        );
        self.external_changes = changes.clone();
        changes
    }

    pub fn external_changes(&self) -> &[ExternalChange] {
        &self.external_changes
    }

    fn forget_change(&mut self, key: &AssociationKey) {
        self.external_changes.retain(|change| change.key() != *key);
    }

    pub fn revert_external_change(&mut self, change: &ExternalChange) -> Result<Option<ActivityEntry>> {
        let entry = self.set_default(change.kind, &change.identifier, &change.old.id, false)?;
        self.forget_change(&change.key());
        self.persist_baseline(&[change.key()]);
        Ok(entry)
    }

    /// Reverts every pending change as one undoable bulk entry.
    pub fn revert_all(&mut self) -> Result<BatchOutcome> {
        let pending = std::mem::take(&mut self.external_changes);
        let mut outcome = BatchOutcome::default();
        let mut touched = Vec::new();

        for change in pending {
            let key = change.key();
            let current = match self.read_current(&key) {
                Ok(current) => current,
                Err(err) => {
                    outcome.failed.push(FailedChange::from_error(key, &err));
                    self.external_changes.push(change);
                    continue;
                }
            };
            if current.as_deref() == Some(change.old.id.as_str()) {
                continue;
            }
            match self.apply_set(&key, &change.old.id) {
                Ok(()) => {
                    outcome.applied.push(ChangeDetail {
                        kind: change.kind,
                        identifier: change.identifier.clone(),
                        old: current.as_deref().map(|id| self.handler_ref(id)),
                        new: Some(change.old.clone()),
                    });
                    touched.push(key);
                }
                Err(err) => {
                    outcome.failed.push(FailedChange::from_error(key, &err));
                    self.external_changes.push(change);
                }
            }
        }

        if !outcome.applied.is_empty() {
            outcome.entry = Some(self.append(ActivityAction::SetBulk {
                handler: None,
                details: outcome.applied.clone(),
            })?);
        }
        self.persist_baseline(&touched);
        Ok(outcome)
    }

    pub fn dismiss(&mut self, change: &ExternalChange) {
        self.forget_change(&change.key());
        self.persist_baseline(&[change.key()]);
        self.audit(
            "dismiss",
            "ok",
            &format!("{}: kept {}", change.key(), change.new),
        );
    }

    pub fn dismiss_all(&mut self) {
        let dismissed = std::mem::take(&mut self.external_changes);
        let touched: Vec<AssociationKey> = dismissed.iter().map(ExternalChange::key).collect();
        self.persist_baseline(&touched);
        self.audit(
            "dismiss",
            "ok",
            &format!("{} external changes accepted", dismissed.len()),
        );
    }

    pub fn list_activity(&self) -> &[ActivityEntry] {
        self.activity.entries()
    }

    pub fn is_undoable(&self, entry: &ActivityEntry) -> bool {
        self.activity.is_undoable(entry)
    }

    pub fn activity_groups(&self) -> Vec<(Bucket, Vec<&ActivityEntry>)> {
        activity::group_by_bucket(self.activity.entries(), self.ctx.now_ms(), self.tz)
    }

    pub fn clear_activity(&mut self) -> Result<usize> {
        let removed = self.activity.clear()?;
        self.toast = UndoToast::Idle;
        self.audit(
            "activity",
            "cleared",
            &format!("{removed} entries removed"),
        );
        Ok(removed)
    }

    fn drifted(&mut self, entry_id: &str, key: AssociationKey) -> anyhow::Error {
        self.refresh();
        if let Err(err) = self.activity.mark_stale(entry_id) {
            warn::emit(
                "ACTIVITY_WRITE_FAILED",
                "undo",
                "mark_stale",
                entry_id,
                "stale mark not persisted",
                &format!("{err:#}"),
            );
        }
        self.audit(
            "undo",
            "drift",
            &format!("{key} changed since entry {entry_id}"),
        );
        WardenError::StateDrift {
            key,
            entry_id: entry_id.to_string(),
        }
        .into()
    }

    fn ensure_available(&self, handler: &HandlerRef) -> Result<()> {
        if self.registry.resolve_handler_info(&handler.id).is_none() {
            return Err(WardenError::HandlerUnavailable {
                handler: handler.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn undo(&mut self, entry_id: &str) -> Result<BatchOutcome> {
        let entry = self
            .activity
            .get(entry_id)
            .cloned()
            .ok_or_else(|| WardenError::UnknownEntry(entry_id.to_string()))?;
        if !self.activity.is_undoable(&entry) {
            return Err(WardenError::NotUndoable(entry_id.to_string()).into());
        }

        match &entry.action {
            ActivityAction::SetSingle(detail) => self.undo_single(&entry.id, detail),
            ActivityAction::SetBulk { details, .. } => self.undo_bulk(&entry.id, details),
            ActivityAction::CreateBackup { .. } | ActivityAction::Restore { .. } => {
                Err(WardenError::NotUndoable(entry_id.to_string()).into())
            }
        }
    }

    fn undo_single(&mut self, entry_id: &str, detail: &ChangeDetail) -> Result<BatchOutcome> {
        let key = detail.key();
        let (Some(old), Some(new)) = (&detail.old, &detail.new) else {
            return Err(WardenError::NotUndoable(entry_id.to_string()).into());
        };

        let current = self.read_current(&key)?;
        if current.as_deref() != Some(new.id.as_str()) {
            return Err(self.drifted(entry_id, key));
        }
        self.ensure_available(old)?;
        self.apply_set(&key, &old.id)?;

        let reversal = ChangeDetail {
            kind: detail.kind,
            identifier: detail.identifier.clone(),
            old: Some(new.clone()),
            new: Some(old.clone()),
        };
        let entry = self.append(ActivityAction::SetSingle(reversal.clone()))?;
        self.persist_baseline(&[key]);
        Ok(BatchOutcome {
            applied: vec![reversal],
            failed: Vec::new(),
            entry: Some(entry),
        })
    }

    // A detail already back on its recorded old handler means drift or a
    // double undo. Overlapping bulk edits can trip this too.
    fn undo_bulk(&mut self, entry_id: &str, details: &[ChangeDetail]) -> Result<BatchOutcome> {
        let mut currents = Vec::with_capacity(details.len());
        let mut outcome = BatchOutcome::default();
        for detail in details {
            let key = detail.key();
            match self.read_current(&key) {
                Ok(current) => {
                    let already_reverted = detail
                        .old
                        .as_ref()
                        .is_some_and(|old| current.as_deref() == Some(old.id.as_str()));
                    if already_reverted {
                        return Err(self.drifted(entry_id, key));
                    }
                    currents.push(Some(current));
                }
                Err(err) => {
                    outcome.failed.push(FailedChange::from_error(key, &err));
                    currents.push(None);
                }
            }
        }

        let mut touched = Vec::new();
        for (detail, current) in details.iter().zip(currents) {
            let (Some(old), Some(current)) = (&detail.old, current) else {
                continue;
            };
            let key = detail.key();
            if let Err(err) = self.ensure_available(old) {
                outcome.failed.push(FailedChange::from_error(key, &err));
                continue;
            }
            match self.apply_set(&key, &old.id) {
                Ok(()) => {
                    outcome.applied.push(ChangeDetail {
                        kind: detail.kind,
                        identifier: detail.identifier.clone(),
                        old: current.as_deref().map(|id| self.handler_ref(id)),
                        new: Some(old.clone()),
                    });
                    touched.push(key);
                }
                Err(err) => outcome.failed.push(FailedChange::from_error(key, &err)),
            }
        }

        if !outcome.applied.is_empty() {
            outcome.entry = Some(self.append(ActivityAction::SetBulk {
                handler: None,
                details: outcome.applied.clone(),
            })?);
            self.persist_baseline(&touched);
        }
        Ok(outcome)
    }

    /// Returns every target edited in `bucket` to where it was before the
    /// first of those edits, as a single logged operation.
    pub fn undo_group(&mut self, bucket: Bucket) -> Result<BatchOutcome> {
        let reversions = {
            let groups = self.activity_groups();
            let entries = groups
                .into_iter()
                .find(|(b, _)| *b == bucket)
                .map(|(_, entries)| entries)
                .unwrap_or_default();
            activity::consolidate(
                entries
                    .into_iter()
                    .filter(|entry| !self.activity.is_stale(&entry.id)),
            )
        };

        let mut outcome = BatchOutcome::default();
        let mut touched = Vec::new();
        for reversion in reversions {
            let key = reversion.key();
            let current = match self.read_current(&key) {
                Ok(current) => current,
                Err(err) => {
                    outcome.failed.push(FailedChange::from_error(key, &err));
                    continue;
                }
            };
            if current.as_deref() == Some(reversion.revert_to.id.as_str()) {
                continue;
            }
            if let Err(err) = self.ensure_available(&reversion.revert_to) {
                outcome.failed.push(FailedChange::from_error(key, &err));
                continue;
            }
            match self.apply_set(&key, &reversion.revert_to.id) {
                Ok(()) => {
                    outcome.applied.push(ChangeDetail {
                        kind: reversion.kind,
                        identifier: reversion.identifier.clone(),
                        old: current.as_deref().map(|id| self.handler_ref(id)),
                        new: Some(reversion.revert_to.clone()),
                    });
                    touched.push(key);
                }
                Err(err) => outcome.failed.push(FailedChange::from_error(key, &err)),
            }
        }

        if !outcome.applied.is_empty() {
            outcome.entry = Some(self.append(ActivityAction::SetBulk {
                handler: None,
                details: outcome.applied.clone(),
            })?);
            self.persist_baseline(&touched);
        }
        Ok(outcome)
    }

    pub fn create_backup(&mut self) -> Result<(PathBuf, BackupRecord)> {
        self.refresh();
        let record = BackupRecord::from_mapping(
            &self.catalog.handler_map(),
            self.ctx.now_ms(),
            backup::os_version(),
        );
        let path = backup::write_backup(&self.ctx.paths.backups_dir, &record, self.tz)?;
        self.append(ActivityAction::CreateBackup {
            backup_path: path.display().to_string(),
            associations: record.len(),
        })?;
        Ok((path, record))
    }

    pub fn list_backups(&self) -> Result<Vec<BackupListing>> {
        backup::list_backups(&self.ctx.paths.backups_dir)
    }

    /// Re-reads the registry first. Never fails; unreadable identifiers are
    /// reported and compared as having no handler.
    pub fn preview_restore(&mut self, candidate: &BackupRecord) -> Vec<DiffEntry> {
        self.refresh();
        let mapping: HandlerMap = candidate
            .mapping()
            .into_iter()
            .map(|(key, handler)| (self.canonical_key(key.kind, &key.identifier), handler))
            .collect();
        let candidate = BackupRecord::from_mapping(
            &mapping,
            candidate.created_at_epoch_ms,
            candidate.os_version.clone(),
        );
        let keys: Vec<AssociationKey> = mapping.into_keys().collect();
        let failures = self.catalog.ensure_tracked(self.registry.as_ref(), &keys);
        self.report_read_failures("restore", &failures);
        backup::preview(&candidate, &self.catalog)
    }

    pub fn apply_restore(&mut self, candidate: &BackupRecord, source: &str) -> Result<RestoreResult> {
        let diffs = self.preview_restore(candidate);
        let mut outcome = RestoreResult::default();
        let mut touched = Vec::new();

        for diff in diffs {
            let key = diff.key();
            let proposed = self.handler_ref(&diff.proposed_handler);
            if let Err(err) = self.ensure_available(&proposed) {
                outcome.failed.push(FailedChange::from_error(key, &err));
                continue;
            }
            match self.apply_set(&key, &diff.proposed_handler) {
                Ok(()) => {
                    outcome.applied.push(ChangeDetail {
                        kind: diff.kind,
                        identifier: diff.identifier.clone(),
                        old: diff.current_handler.as_deref().map(|id| self.handler_ref(id)),
                        new: Some(proposed),
                    });
                    touched.push(key);
                }
                Err(err) => outcome.failed.push(FailedChange::from_error(key, &err)),
            }
        }

        if !outcome.applied.is_empty() || !outcome.failed.is_empty() {
            outcome.entry = Some(self.append(ActivityAction::Restore {
                backup_path: source.to_string(),
                details: outcome.applied.clone(),
                failed: outcome.failed.len(),
            })?);
        }
        if !touched.is_empty() {
            self.persist_baseline(&touched);
        }
        Ok(outcome)
    }

    pub fn toast(&self) -> &UndoToast {
        &self.toast
    }

    /// Runs the armed undo if it is still inside its window.
    pub fn invoke_toast(&mut self) -> Result<Option<BatchOutcome>> {
        match self.toast.invoke(self.ctx.now_ms()) {
            Some(ToastAction::UndoEntry(id)) => Ok(Some(self.undo(&id)?)),
            None => Ok(None),
        }
    }

    pub fn expire_toast(&mut self, scheduled_message: &str) -> bool {
        self.toast.expire(scheduled_message, self.ctx.now_ms())
    }
}
