pub mod file;
pub mod xdg;

use crate::warden::config::WardenConfig;
use crate::warden::model::{AssociationKind, HandlerInfo};
use crate::warden::paths::WardenPaths;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// The operating system's handler table, seen from the outside.
///
/// Reads take `&self` so catalog reloads can fan out across threads; a set
/// goes through the single owner.
pub trait HandlerRegistry: Send + Sync {
    fn backend(&self) -> &'static str;

    fn get_handler(&self, kind: AssociationKind, identifier: &str) -> Result<Option<String>>;

    fn get_all_handlers(&self, kind: AssociationKind, identifier: &str) -> Result<Vec<String>>;

    /// Fails with `WardenError::RegistryRejection` when the OS refuses.
    fn set_handler(&mut self, kind: AssociationKind, identifier: &str, handler_id: &str)
    -> Result<()>;

    fn resolve_handler_info(&self, handler_id: &str) -> Option<HandlerInfo>;

    /// Identifiers the registry itself has an explicit mapping for.
    fn known_identifiers(&self, kind: AssociationKind) -> Result<Vec<String>>;

    /// The spelling the registry keys this association by. Two identifiers
    /// naming the same OS association must map to the same string.
    fn canonical_identifier(&self, _kind: AssociationKind, identifier: &str) -> String {
        identifier.trim().to_string()
    }

    fn handler_name(&self, handler_id: &str) -> String {
        self.resolve_handler_info(handler_id)
            .map(|info| info.name)
            .unwrap_or_else(|| handler_id.to_string())
    }
}

fn default_registry_file(paths: &WardenPaths) -> PathBuf {
    paths.state_dir.join("registry.json")
}

pub fn open_registry(cfg: &WardenConfig, paths: &WardenPaths) -> Result<Box<dyn HandlerRegistry>> {
    let file_path = cfg
        .registry
        .file_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_registry_file(paths));

    match cfg.registry.backend.as_str() {
        "file" => Ok(Box::new(file::FileRegistry::open(&file_path)?)),
        "xdg" => Ok(Box::new(
            xdg::XdgRegistry::discover().context("xdg registry backend unavailable")?,
        )),
        _ => match xdg::XdgRegistry::discover() {
            Ok(registry) => Ok(Box::new(registry)),
            Err(_) => Ok(Box::new(file::FileRegistry::open(&file_path)?)),
        },
    }
}
