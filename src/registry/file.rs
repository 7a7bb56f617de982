use crate::error::WardenError;
use crate::registry::HandlerRegistry;
use crate::warden::model::{AssociationKey, AssociationKind, HandlerInfo};
use crate::warden::util::write_json_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRow {
    pub current: Option<String>,
    #[serde(default)]
    pub available: Vec<String>,
    /// Every set on this row is refused with this reason.
    #[serde(default)]
    pub locked: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerInfo>,
    #[serde(default)]
    pub file_types: BTreeMap<String, RegistryRow>,
    #[serde(default)]
    pub url_schemes: BTreeMap<String, RegistryRow>,
    /// Extension (no dot, lowercase) to the file-type identifier it names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl RegistryDocument {
    pub fn with_handler(mut self, id: &str, name: &str) -> Self {
        self.handlers.insert(
            id.to_string(),
            HandlerInfo {
                name: name.to_string(),
                icon_ref: None,
            },
        );
        self
    }

    pub fn with_association(
        mut self,
        kind: AssociationKind,
        identifier: &str,
        current: Option<&str>,
        available: &[&str],
    ) -> Self {
        self.table_mut(kind).insert(
            identifier.to_string(),
            RegistryRow {
                current: current.map(ToOwned::to_owned),
                available: available.iter().map(|s| (*s).to_string()).collect(),
                locked: None,
            },
        );
        self
    }

    fn table(&self, kind: AssociationKind) -> &BTreeMap<String, RegistryRow> {
        match kind {
            AssociationKind::FileType => &self.file_types,
            AssociationKind::UrlScheme => &self.url_schemes,
        }
    }

    fn table_mut(&mut self, kind: AssociationKind) -> &mut BTreeMap<String, RegistryRow> {
        match kind {
            AssociationKind::FileType => &mut self.file_types,
            AssociationKind::UrlScheme => &mut self.url_schemes,
        }
    }
}

/// Handler table kept in a JSON document instead of the OS.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: Option<PathBuf>,
    doc: RegistryDocument,
}

impl FileRegistry {
    pub fn in_memory(doc: RegistryDocument) -> Self {
        Self { path: None, doc }
    }

    /// Opens `path`, starting from an empty table when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse registry file {}", path.display()))?
        } else {
            RegistryDocument::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            doc,
        })
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            write_json_atomic(path, &self.doc)?;
        }
        Ok(())
    }

    fn reject(kind: AssociationKind, identifier: &str, reason: String) -> anyhow::Error {
        WardenError::RegistryRejection {
            key: AssociationKey::new(kind, identifier),
            reason,
        }
        .into()
    }
}

impl HandlerRegistry for FileRegistry {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn get_handler(&self, kind: AssociationKind, identifier: &str) -> Result<Option<String>> {
        Ok(self
            .doc
            .table(kind)
            .get(identifier)
            .and_then(|row| row.current.clone()))
    }

    fn get_all_handlers(&self, kind: AssociationKind, identifier: &str) -> Result<Vec<String>> {
        let Some(row) = self.doc.table(kind).get(identifier) else {
            return Ok(Vec::new());
        };
        let mut out = row.available.clone();
        if let Some(current) = &row.current
            && !out.contains(current)
        {
            out.insert(0, current.clone());
        }
        Ok(out)
    }

    fn set_handler(
        &mut self,
        kind: AssociationKind,
        identifier: &str,
        handler_id: &str,
    ) -> Result<()> {
        if !self.doc.handlers.contains_key(handler_id) {
            return Err(Self::reject(
                kind,
                identifier,
                format!("no installed application with id {handler_id}"),
            ));
        }

        let row = self
            .doc
            .table_mut(kind)
            .entry(identifier.to_string())
            .or_default();
        if let Some(reason) = &row.locked {
            return Err(Self::reject(kind, identifier, reason.clone()));
        }
        if !row.available.is_empty() && !row.available.iter().any(|id| id == handler_id) {
            return Err(Self::reject(
                kind,
                identifier,
                format!("{handler_id} cannot open {identifier}"),
            ));
        }
        if row.available.is_empty() {
            row.available.push(handler_id.to_string());
        }
        row.current = Some(handler_id.to_string());

        self.persist()
    }

    fn resolve_handler_info(&self, handler_id: &str) -> Option<HandlerInfo> {
        self.doc.handlers.get(handler_id).cloned()
    }

    fn known_identifiers(&self, kind: AssociationKind) -> Result<Vec<String>> {
        Ok(self.doc.table(kind).keys().cloned().collect())
    }

    fn canonical_identifier(&self, kind: AssociationKind, identifier: &str) -> String {
        let trimmed = identifier.trim();
        if kind == AssociationKind::FileType
            && let Some(target) = self
                .doc
                .extensions
                .get(&trimmed.trim_start_matches('.').to_ascii_lowercase())
        {
            return target.clone();
        }
        trimmed.to_string()
    }
}
