use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WardenPaths {
    pub warden_home: PathBuf,
    pub state_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl WardenPaths {
    /// Layout rooted at `home` with no env overrides.
    pub fn under(home: &Path) -> Self {
        Self {
            warden_home: home.to_path_buf(),
            state_dir: home.join("state"),
            backups_dir: home.join("backups"),
            logs_dir: home.join("logs"),
        }
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.state_dir.join("snapshot.json")
    }

    pub fn activity_file(&self) -> PathBuf {
        self.state_dir.join("activity.json")
    }

    pub fn session_lock_file(&self) -> PathBuf {
        self.state_dir.join("session.lock")
    }

    pub fn audit_log_file(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

fn required_data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".local/share"));
    }
    Err(anyhow::anyhow!("data directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<WardenPaths> {
    let warden_home = env_or_default_path("WARDEN_HOME", required_data_dir()?.join("warden"));

    let state_dir = env_or_default_path("WARDEN_STATE_DIR", warden_home.join("state"));
    let backups_dir = env_or_default_path("WARDEN_BACKUPS_DIR", warden_home.join("backups"));
    let logs_dir = env_or_default_path("WARDEN_LOGS_DIR", warden_home.join("logs"));

    Ok(WardenPaths {
        warden_home,
        state_dir,
        backups_dir,
        logs_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::WardenPaths;
    use std::path::Path;

    #[test]
    fn layout_under_home_is_stable() {
        let paths = WardenPaths::under(Path::new("/tmp/w"));
        assert_eq!(paths.snapshot_file(), Path::new("/tmp/w/state/snapshot.json"));
        assert_eq!(paths.activity_file(), Path::new("/tmp/w/state/activity.json"));
        assert_eq!(paths.audit_log_file(), Path::new("/tmp/w/logs/audit.log"));
    }
}
