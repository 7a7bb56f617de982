use crate::warden::catalog::AssociationCatalog;
use crate::warden::model::{AssociationKey, AssociationKind};
use crate::warden::snapshot::HandlerMap;
use crate::warden::util::write_json_atomic;
use anyhow::{Context, Result};
use chrono::TimeZone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub version: u32,
    pub created_at_epoch_ms: u64,
    pub os_version: String,
    #[serde(default)]
    pub file_types: BTreeMap<String, String>,
    #[serde(default)]
    pub url_schemes: BTreeMap<String, String>,
}

impl BackupRecord {
    pub fn from_mapping(mapping: &HandlerMap, created_at_epoch_ms: u64, os_version: String) -> Self {
        let mut record = Self {
            version: BACKUP_FORMAT_VERSION,
            created_at_epoch_ms,
            os_version,
            file_types: BTreeMap::new(),
            url_schemes: BTreeMap::new(),
        };
        for (key, handler) in mapping {
            let table = match key.kind {
                AssociationKind::FileType => &mut record.file_types,
                AssociationKind::UrlScheme => &mut record.url_schemes,
            };
            table.insert(key.identifier.clone(), handler.clone());
        }
        record
    }

    pub fn mapping(&self) -> HandlerMap {
        let file_types = self
            .file_types
            .iter()
            .map(|(id, h)| (AssociationKey::new(AssociationKind::FileType, id.clone()), h.clone()));
        let url_schemes = self
            .url_schemes
            .iter()
            .map(|(id, h)| (AssociationKey::new(AssociationKind::UrlScheme, id.clone()), h.clone()));
        file_types.chain(url_schemes).collect()
    }

    pub fn len(&self) -> usize {
        self.file_types.len() + self.url_schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub kind: AssociationKind,
    pub identifier: String,
    pub current_handler: Option<String>,
    pub proposed_handler: String,
}

impl DiffEntry {
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.kind, self.identifier.clone())
    }
}

/// What restoring `candidate` would change. Pure; an empty result means the
/// restore is a no-op.
pub fn preview(candidate: &BackupRecord, catalog: &AssociationCatalog) -> Vec<DiffEntry> {
    candidate
        .mapping()
        .into_iter()
        .filter_map(|(key, proposed)| {
            let current = catalog.current_handler(&key);
            (current != Some(proposed.as_str())).then(|| DiffEntry {
                kind: key.kind,
                current_handler: current.map(ToOwned::to_owned),
                identifier: key.identifier,
                proposed_handler: proposed,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BackupListing {
    pub path: PathBuf,
    pub record: BackupRecord,
}

pub fn backup_file_name(created_at_epoch_ms: u64, tz: Tz) -> String {
    let stamp = tz
        .timestamp_millis_opt(i64::try_from(created_at_epoch_ms).unwrap_or(i64::MAX))
        .single()
        .map(|dt| dt.format("%Y%m%d-%H%M%S").to_string())
        .unwrap_or_else(|| created_at_epoch_ms.to_string());
    format!("backup-{stamp}.json")
}

/// Writes `record` into `dir` without overwriting an existing backup.
pub fn write_backup(dir: &Path, record: &BackupRecord, tz: Tz) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let base = backup_file_name(record.created_at_epoch_ms, tz);
    let mut path = dir.join(&base);
    let mut suffix = 1usize;
    while path.exists() {
        let stem = base.trim_end_matches(".json");
        path = dir.join(format!("{stem}-{suffix}.json"));
        suffix += 1;
    }
    write_json_atomic(&path, record)?;
    Ok(path)
}

/// Backups are often edited by hand, so comments and trailing commas are
/// accepted.
pub fn load_backup(path: &Path) -> Result<BackupRecord> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let record: BackupRecord = json5::from_str(&raw)
        .with_context(|| format!("failed to parse backup {}", path.display()))?;
    if record.version > BACKUP_FORMAT_VERSION {
        anyhow::bail!(
            "backup {} uses format version {}; this build reads up to {}",
            path.display(),
            record.version,
            BACKUP_FORMAT_VERSION
        );
    }
    Ok(record)
}

/// Newest first. Unreadable files are skipped.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupListing>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(record) = load_backup(&path) {
            out.push(BackupListing { path, record });
        }
    }
    out.sort_by(|a, b| {
        b.record
            .created_at_epoch_ms
            .cmp(&a.record.created_at_epoch_ms)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(out)
}

fn parse_os_release(raw: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let value = line.trim().strip_prefix("PRETTY_NAME=")?;
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub fn os_version() -> String {
    fs::read_to_string("/etc/os-release")
        .ok()
        .as_deref()
        .and_then(parse_os_release)
        .unwrap_or_else(|| format!("{} {}", std::env::consts::OS, std::env::consts::ARCH))
}
