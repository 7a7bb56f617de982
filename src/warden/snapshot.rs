use crate::warden::model::{AssociationKey, AssociationKind};
use crate::warden::util::write_json_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type HandlerMap = BTreeMap<AssociationKey, String>;

/// Last known good mapping. There is only ever one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub taken_at_epoch_ms: u64,
    pub mapping: HandlerMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    kind: AssociationKind,
    identifier: String,
    handler_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    taken_at_epoch_ms: u64,
    entries: Vec<SnapshotRow>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` on first run; an unreadable file is an error for the caller
    /// to degrade on.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let parsed: SnapshotFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mapping = parsed
            .entries
            .into_iter()
            .map(|row| (AssociationKey::new(row.kind, row.identifier), row.handler_id))
            .collect();
        Ok(Some(Snapshot {
            taken_at_epoch_ms: parsed.taken_at_epoch_ms,
            mapping,
        }))
    }

    pub fn save(&self, mapping: &HandlerMap, taken_at_epoch_ms: u64) -> Result<Snapshot> {
        let file = SnapshotFile {
            schema_version: 1,
            taken_at_epoch_ms,
            entries: mapping
                .iter()
                .map(|(key, handler_id)| SnapshotRow {
                    kind: key.kind,
                    identifier: key.identifier.clone(),
                    handler_id: handler_id.clone(),
                })
                .collect(),
        };
        write_json_atomic(&self.path, &file)?;
        Ok(Snapshot {
            taken_at_epoch_ms,
            mapping: mapping.clone(),
        })
    }
}
