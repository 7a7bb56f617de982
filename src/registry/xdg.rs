use crate::error::WardenError;
use crate::registry::HandlerRegistry;
use crate::warden::model::{AssociationKey, AssociationKind, HandlerInfo};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SCHEME_PREFIX: &str = "x-scheme-handler/";

/// freedesktop.org handler table driven through `xdg-mime`.
///
/// File-type identifiers are MIME types; a leading-dot extension is mapped
/// through the system `mime.types` tables first.
#[derive(Debug, Clone)]
pub struct XdgRegistry {
    bin: PathBuf,
    app_dirs: Vec<PathBuf>,
    mimeapps_list: Option<PathBuf>,
    extensions: BTreeMap<String, String>,
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn application_dirs() -> Vec<PathBuf> {
    let mut out = Vec::new();
    let data_home = env_path("XDG_DATA_HOME")
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")));
    if let Some(dir) = data_home {
        out.push(dir.join("applications"));
    }

    let data_dirs = env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    for dir in data_dirs.split(':').map(str::trim).filter(|s| !s.is_empty()) {
        out.push(Path::new(dir).join("applications"));
    }
    out
}

fn resolve_xdg_mime_bin() -> Result<PathBuf> {
    if let Some(custom) = env_path("WARDEN_XDG_MIME_BIN") {
        if custom.is_file() {
            return Ok(custom);
        }
        anyhow::bail!("WARDEN_XDG_MIME_BIN is not a file: {}", custom.display());
    }
    which::which("xdg-mime").context("xdg-mime not found on PATH")
}

/// Parses `mime.types` content into extension → MIME type.
fn parse_mime_types(raw: &str, out: &mut BTreeMap<String, String>) {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(mime) = parts.next() else {
            continue;
        };
        for ext in parts {
            out.entry(ext.to_ascii_lowercase())
                .or_insert_with(|| mime.to_string());
        }
    }
}

/// Reads `key=a.desktop;b.desktop;` lines from one `[section]` of a
/// desktop-style ini file.
fn parse_section_lists(raw: &str, section: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut in_section = false;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_section = trimmed == format!("[{section}]");
            continue;
        }
        if !in_section || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let list = out.entry(key.trim().to_string()).or_default();
        for id in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if !list.iter().any(|existing| existing == id) {
                list.push(id.to_string());
            }
        }
    }
    out
}

fn parse_desktop_entry(raw: &str) -> Option<HandlerInfo> {
    let mut in_entry = false;
    let mut name = None;
    let mut icon = None;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_entry = trimmed == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some(value) = trimmed.strip_prefix("Name=") {
            name.get_or_insert_with(|| value.trim().to_string());
        } else if let Some(value) = trimmed.strip_prefix("Icon=") {
            icon.get_or_insert_with(|| value.trim().to_string());
        }
    }
    name.map(|name| HandlerInfo {
        name,
        icon_ref: icon,
    })
}

impl XdgRegistry {
    pub fn discover() -> Result<Self> {
        let bin = resolve_xdg_mime_bin()?;

        let mut extensions = BTreeMap::new();
        let mut tables = vec![PathBuf::from("/etc/mime.types")];
        if let Some(home) = dirs::home_dir() {
            tables.insert(0, home.join(".mime.types"));
        }
        for table in tables {
            if let Ok(raw) = fs::read_to_string(&table) {
                parse_mime_types(&raw, &mut extensions);
            }
        }

        let mimeapps_list = env_path("XDG_CONFIG_HOME")
            .or_else(dirs::config_dir)
            .map(|dir| dir.join("mimeapps.list"));

        Ok(Self {
            bin,
            app_dirs: application_dirs(),
            mimeapps_list,
            extensions,
        })
    }

    fn mime_for(&self, kind: AssociationKind, identifier: &str) -> Result<String> {
        match kind {
            AssociationKind::UrlScheme => Ok(format!("{SCHEME_PREFIX}{}", identifier.trim())),
            AssociationKind::FileType if identifier.contains('/') => Ok(identifier.to_string()),
            AssociationKind::FileType => {
                let ext = identifier.trim_start_matches('.').to_ascii_lowercase();
                self.extensions
                    .get(&ext)
                    .cloned()
                    .with_context(|| format!("no MIME type registered for extension {identifier}"))
            }
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.bin)
            .args(args)
            .output()
            .with_context(|| format!("failed to run `{} {}`", self.bin.display(), args.join(" ")))
    }

    fn desktop_file(&self, handler_id: &str) -> Option<PathBuf> {
        self.app_dirs
            .iter()
            .map(|dir| dir.join(handler_id))
            .find(|path| path.is_file())
    }

    fn capable_handlers(&self, mime: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for dir in &self.app_dirs {
            let Ok(raw) = fs::read_to_string(dir.join("mimeinfo.cache")) else {
                continue;
            };
            let table = parse_section_lists(&raw, "MIME Cache");
            for id in table.get(mime).into_iter().flatten() {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }
}

impl HandlerRegistry for XdgRegistry {
    fn backend(&self) -> &'static str {
        "xdg"
    }

    fn get_handler(&self, kind: AssociationKind, identifier: &str) -> Result<Option<String>> {
        let mime = self.mime_for(kind, identifier)?;
        let out = self.run(&["query", "default", &mime])?;
        if !out.status.success() {
            anyhow::bail!(
                "xdg-mime query default {mime} failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        let handler = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!handler.is_empty()).then_some(handler))
    }

    fn get_all_handlers(&self, kind: AssociationKind, identifier: &str) -> Result<Vec<String>> {
        let mime = self.mime_for(kind, identifier)?;
        let mut out = self.capable_handlers(&mime);
        if let Some(current) = self.get_handler(kind, identifier)?
            && !out.contains(&current)
        {
            out.insert(0, current);
        }
        Ok(out)
    }

    fn set_handler(
        &mut self,
        kind: AssociationKind,
        identifier: &str,
        handler_id: &str,
    ) -> Result<()> {
        let key = AssociationKey::new(kind, identifier);
        let mime = self
            .mime_for(kind, identifier)
            .map_err(|err| WardenError::RegistryRejection {
                key: key.clone(),
                reason: err.to_string(),
            })?;
        if self.desktop_file(handler_id).is_none() {
            return Err(WardenError::RegistryRejection {
                key,
                reason: format!("no desktop entry named {handler_id}"),
            }
            .into());
        }

        let out = self.run(&["default", handler_id, &mime])?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(WardenError::RegistryRejection {
                key,
                reason: if stderr.is_empty() {
                    format!("xdg-mime exited with {}", out.status)
                } else {
                    stderr
                },
            }
            .into());
        }
        Ok(())
    }

    fn resolve_handler_info(&self, handler_id: &str) -> Option<HandlerInfo> {
        let path = self.desktop_file(handler_id)?;
        let raw = fs::read_to_string(path).ok()?;
        parse_desktop_entry(&raw)
    }

    fn known_identifiers(&self, kind: AssociationKind) -> Result<Vec<String>> {
        let Some(path) = &self.mimeapps_list else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let defaults = parse_section_lists(&raw, "Default Applications");
        let out = defaults
            .into_keys()
            .filter_map(|mime| match (kind, mime.strip_prefix(SCHEME_PREFIX)) {
                (AssociationKind::UrlScheme, Some(scheme)) => Some(scheme.to_string()),
                (AssociationKind::FileType, None) => Some(mime),
                _ => None,
            })
            .collect();
        Ok(out)
    }

    fn canonical_identifier(&self, kind: AssociationKind, identifier: &str) -> String {
        let trimmed = identifier.trim();
        match kind {
            AssociationKind::UrlScheme => trimmed.to_ascii_lowercase(),
            AssociationKind::FileType => self
                .mime_for(kind, trimmed)
                .unwrap_or_else(|_| trimmed.to_string()),
        }
    }
}
