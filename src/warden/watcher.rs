use crate::error::{WardenError, WardenErrorCode, code_of};
use crate::registry::{HandlerRegistry, open_registry};
use crate::warden::audit;
use crate::warden::engine::{BatchOutcome, Engine, WardenContext};
use crate::warden::model::ExternalChange;
use crate::warden::paths::WardenPaths;
use crate::warden::warn;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const DAEMON_LOCK_FILE: &str = "warden-watch.daemon.lock";

#[derive(Debug, Clone)]
pub struct WatchCycleOutcome {
    pub at_epoch_ms: u64,
    pub backend: &'static str,
    pub poll_interval_secs: u64,
    pub auto_revert: bool,
    pub external_changes: Vec<ExternalChange>,
    pub reverted: Option<BatchOutcome>,
}

pub fn daemon_lock_path(paths: &WardenPaths) -> PathBuf {
    paths.logs_dir.join(DAEMON_LOCK_FILE)
}

/// Held for the daemon's lifetime; the file carries the owner's pid.
pub fn acquire_daemon_lock(paths: &WardenPaths) -> Result<File> {
    let path = daemon_lock_path(paths);
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        return Err(WardenError::Locked(path.display().to_string()).into());
    }
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(file)
}

/// One guard pass: a fresh session, so detection runs exactly once per cycle.
pub fn run_cycle(ctx: &WardenContext, registry: Box<dyn HandlerRegistry>) -> Result<WatchCycleOutcome> {
    let mut engine = Engine::open(ctx.clone(), registry)?;
    let external_changes = engine.detect_external_changes();
    for change in &external_changes {
        audit::record(
            &ctx.paths,
            ctx.clock.now_ms(),
            "watch",
            "external-change",
            &format!("{}: {} -> {}", change.key(), change.old, change.new),
        );
    }

    let reverted = if ctx.config.watcher.auto_revert && !external_changes.is_empty() {
        let outcome = engine.revert_all()?;
        for failed in &outcome.failed {
            warn::emit(
                failed.code.unwrap_or("REVERT_FAILED"),
                "watch",
                "revert",
                &failed.key.to_string(),
                "external change kept",
                &failed.error,
            );
        }
        Some(outcome)
    } else {
        None
    };

    Ok(WatchCycleOutcome {
        at_epoch_ms: ctx.clock.now_ms(),
        backend: engine.registry_backend(),
        poll_interval_secs: ctx.config.watcher.poll_interval_secs,
        auto_revert: ctx.config.watcher.auto_revert,
        external_changes,
        reverted,
    })
}

pub fn run_once() -> Result<WatchCycleOutcome> {
    let ctx = WardenContext::from_env()?;
    let registry = open_registry(&ctx.config, &ctx.paths)?;
    run_cycle(&ctx, registry)
}

pub fn run_daemon() -> Result<()> {
    let ctx = WardenContext::from_env()?;
    let _lock = acquire_daemon_lock(&ctx.paths)?;
    audit::record(&ctx.paths, ctx.clock.now_ms(), "watch", "started", "daemon");

    loop {
        let poll_interval_secs = match run_once() {
            Ok(cycle) => cycle.poll_interval_secs,
            // an interactive session owns the state right now; try next tick
            Err(err) if code_of(&err) == Some(WardenErrorCode::E001Locked) => {
                warn::emit(
                    WardenErrorCode::E001Locked.as_str(),
                    "watch",
                    "cycle",
                    "session",
                    "cycle skipped",
                    &format!("{err:#}"),
                );
                ctx.config.watcher.poll_interval_secs
            }
            Err(err) => return Err(err),
        };
        thread::sleep(Duration::from_secs(poll_interval_secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::file::{FileRegistry, RegistryDocument};
    use crate::warden::config::WardenConfig;
    use crate::warden::model::AssociationKind;
    use crate::warden::util::{ManualClock, write_json_atomic};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn seed(current: &str) -> RegistryDocument {
        RegistryDocument::default()
            .with_handler("org.a", "AppA")
            .with_handler("org.b", "AppB")
            .with_association(
                AssociationKind::FileType,
                ".json",
                Some(current),
                &["org.a", "org.b"],
            )
    }

    fn context(home: &Path, clock: &ManualClock, auto_revert: bool) -> WardenContext {
        let mut config = WardenConfig::default();
        config.tracking.file_types = vec![".json".into()];
        config.tracking.url_schemes = Vec::new();
        config.watcher.auto_revert = auto_revert;
        WardenContext::new(WardenPaths::under(home), config, Arc::new(clock.clone()))
    }

    fn registry(path: &Path) -> Box<dyn HandlerRegistry> {
        Box::new(FileRegistry::open(path).expect("registry"))
    }

    #[test]
    fn cycle_reports_each_external_change_once() {
        let tmp = tempdir().expect("tempdir");
        let reg = tmp.path().join("registry.json");
        write_json_atomic(&reg, &seed("org.a")).expect("seed");
        let clock = ManualClock::at(1_000_000);
        let ctx = context(&tmp.path().join("home"), &clock, false);

        let first = run_cycle(&ctx, registry(&reg)).expect("baseline cycle");
        assert!(first.external_changes.is_empty());

        write_json_atomic(&reg, &seed("org.b")).expect("external write");
        clock.advance_ms(60_000);
        let second = run_cycle(&ctx, registry(&reg)).expect("second cycle");
        assert_eq!(second.external_changes.len(), 1);
        assert!(second.reverted.is_none());

        clock.advance_ms(60_000);
        let third = run_cycle(&ctx, registry(&reg)).expect("third cycle");
        assert!(third.external_changes.is_empty());

        let events = audit::read_events(&ctx.paths).expect("audit");
        assert!(events.iter().any(|e| e.status == "external-change"));
    }

    #[test]
    fn auto_revert_puts_the_old_handler_back() {
        let tmp = tempdir().expect("tempdir");
        let reg = tmp.path().join("registry.json");
        write_json_atomic(&reg, &seed("org.a")).expect("seed");
        let clock = ManualClock::at(1_000_000);
        let ctx = context(&tmp.path().join("home"), &clock, true);

        run_cycle(&ctx, registry(&reg)).expect("baseline cycle");
        write_json_atomic(&reg, &seed("org.b")).expect("external write");
        clock.advance_ms(60_000);

        let cycle = run_cycle(&ctx, registry(&reg)).expect("revert cycle");
        let reverted = cycle.reverted.expect("reverted");
        assert_eq!(reverted.applied.len(), 1);

        let after = FileRegistry::open(&reg).expect("reopen");
        assert_eq!(
            after
                .get_handler(AssociationKind::FileType, ".json")
                .expect("read")
                .as_deref(),
            Some("org.a")
        );

        clock.advance_ms(60_000);
        let quiet = run_cycle(&ctx, registry(&reg)).expect("quiet cycle");
        assert!(quiet.external_changes.is_empty());
    }

    #[test]
    fn daemon_lock_is_exclusive_and_records_pid() {
        let tmp = tempdir().expect("tempdir");
        let paths = WardenPaths::under(tmp.path());
        let held = acquire_daemon_lock(&paths).expect("first lock");
        let err = acquire_daemon_lock(&paths).expect_err("second lock");
        assert_eq!(code_of(&err), Some(WardenErrorCode::E001Locked));

        let raw = fs::read_to_string(daemon_lock_path(&paths)).expect("read lock");
        assert_eq!(raw.trim(), std::process::id().to_string());
        drop(held);
        assert!(acquire_daemon_lock(&paths).is_ok());
    }
}
