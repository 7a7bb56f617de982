use crate::registry::HandlerRegistry;
use crate::warden::config::TrackingConfig;
use crate::warden::model::{Association, AssociationKey, AssociationKind};
use crate::warden::snapshot::HandlerMap;
use crate::warden::warn;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::thread;

/// Identifier that could not be read during a reload.
#[derive(Debug, Clone)]
pub struct ReadFailure {
    pub key: AssociationKey,
    pub error: String,
}

#[derive(Debug, Default)]
struct KindLoad {
    associations: Vec<Association>,
    failures: Vec<ReadFailure>,
}

fn read_association(
    registry: &dyn HandlerRegistry,
    kind: AssociationKind,
    identifier: &str,
) -> Result<Association> {
    let current_handler = registry.get_handler(kind, identifier)?;
    let available_handlers = registry.get_all_handlers(kind, identifier)?;
    Ok(Association {
        identifier: identifier.to_string(),
        kind,
        current_handler,
        available_handlers,
    })
}

fn tracked_identifiers(
    registry: &dyn HandlerRegistry,
    tracking: &TrackingConfig,
    kind: AssociationKind,
) -> BTreeSet<String> {
    let configured = match kind {
        AssociationKind::FileType => &tracking.file_types,
        AssociationKind::UrlScheme => &tracking.url_schemes,
    };
    let mut out: BTreeSet<String> = configured
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| registry.canonical_identifier(kind, s))
        .collect();
    if tracking.include_registry_known {
        match registry.known_identifiers(kind) {
            Ok(known) => out.extend(
                known
                    .iter()
                    .map(|id| registry.canonical_identifier(kind, id)),
            ),
            Err(err) => warn::emit(
                "REGISTRY_ENUM_FAILED",
                "catalog",
                "known_identifiers",
                kind.as_str(),
                "registry enumeration failed",
                &format!("{err:#}"),
            ),
        }
    }
    out
}

fn load_kind(
    registry: &dyn HandlerRegistry,
    identifiers: &BTreeSet<String>,
    kind: AssociationKind,
) -> KindLoad {
    let mut out = KindLoad::default();
    for identifier in identifiers {
        match read_association(registry, kind, identifier) {
            Ok(association) => out.associations.push(association),
            Err(err) => out.failures.push(ReadFailure {
                key: AssociationKey::new(kind, identifier.clone()),
                error: format!("{err:#}"),
            }),
        }
    }
    out
}

/// Working set of associations, as last read from the registry.
#[derive(Debug, Default, Clone)]
pub struct AssociationCatalog {
    associations: BTreeMap<AssociationKey, Association>,
    loaded: BTreeSet<AssociationKind>,
}

impl AssociationCatalog {
    pub fn is_loaded(&self, kind: AssociationKind) -> bool {
        self.loaded.contains(&kind)
    }

    /// Reloads the given kinds. Registry reads run on worker threads; the
    /// results are applied here, after every worker has joined.
    pub fn refresh(
        &mut self,
        registry: &dyn HandlerRegistry,
        tracking: &TrackingConfig,
        kinds: &[AssociationKind],
    ) -> Vec<ReadFailure> {
        let loads: Vec<(AssociationKind, KindLoad)> = thread::scope(|scope| {
            let workers: Vec<_> = kinds
                .iter()
                .map(|&kind| {
                    scope.spawn(move || {
                        let identifiers = tracked_identifiers(registry, tracking, kind);
                        (kind, load_kind(registry, &identifiers, kind))
                    })
                })
                .collect();
            workers
                .into_iter()
                .zip(kinds.iter())
                .map(|(worker, &kind)| {
                    worker.join().unwrap_or_else(|_| {
                        (
                            kind,
                            KindLoad {
                                associations: Vec::new(),
                                failures: vec![ReadFailure {
                                    key: AssociationKey::new(kind, "*"),
                                    error: "registry reader panicked".to_string(),
                                }],
                            },
                        )
                    })
                })
                .collect()
        });

        let mut failures = Vec::new();
        for (kind, load) in loads {
            self.associations.retain(|key, _| key.kind != kind);
            for association in load.associations {
                self.associations.insert(association.key(), association);
            }
            self.loaded.insert(kind);
            failures.extend(load.failures);
        }
        failures
    }

    /// Re-reads a single association, adding it when it was not tracked.
    pub fn refresh_one(&mut self, registry: &dyn HandlerRegistry, key: &AssociationKey) -> Result<&Association> {
        let association = read_association(registry, key.kind, &key.identifier)?;
        self.associations.insert(key.clone(), association);
        self.associations
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("association {key} vanished from catalog"))
    }

    /// Pulls in every key not tracked yet, leaving tracked ones untouched.
    pub fn ensure_tracked<'a>(
        &mut self,
        registry: &dyn HandlerRegistry,
        keys: impl IntoIterator<Item = &'a AssociationKey>,
    ) -> Vec<ReadFailure> {
        let mut failures = Vec::new();
        for key in keys {
            if self.associations.contains_key(key) {
                continue;
            }
            match read_association(registry, key.kind, &key.identifier) {
                Ok(association) => {
                    self.associations.insert(key.clone(), association);
                }
                Err(err) => failures.push(ReadFailure {
                    key: key.clone(),
                    error: format!("{err:#}"),
                }),
            }
        }
        failures
    }

    /// Records a set the registry accepted.
    pub fn apply_set(&mut self, key: &AssociationKey, handler_id: &str) {
        let association = self
            .associations
            .entry(key.clone())
            .or_insert_with(|| Association {
                identifier: key.identifier.clone(),
                kind: key.kind,
                current_handler: None,
                available_handlers: Vec::new(),
            });
        association.current_handler = Some(handler_id.to_string());
        if !association.available_handlers.iter().any(|id| id == handler_id) {
            association.available_handlers.push(handler_id.to_string());
        }
    }

    pub fn current_handler(&self, key: &AssociationKey) -> Option<&str> {
        self.associations
            .get(key)
            .and_then(|a| a.current_handler.as_deref())
    }

    pub fn list(&self, kind: AssociationKind) -> Vec<Association> {
        self.associations
            .values()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Associations that currently have a handler, keyed for snapshots.
    pub fn handler_map(&self) -> HandlerMap {
        self.associations
            .iter()
            .filter_map(|(key, a)| a.current_handler.clone().map(|h| (key.clone(), h)))
            .collect()
    }
}
