use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub retention_days: u64,
    pub max_entries: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_entries: 100,
        }
    }
}

impl ActivityConfig {
    pub fn retention_ms(&self) -> u64 {
        self.retention_days.saturating_mul(24 * 60 * 60 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub file_types: Vec<String>,
    pub url_schemes: Vec<String>,
    #[serde(default = "default_include_registry_known")]
    pub include_registry_known: bool,
}

fn default_include_registry_known() -> bool {
    true
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            file_types: [
                "text/plain",
                "text/html",
                "application/pdf",
                "application/json",
                "image/png",
                "image/jpeg",
            ]
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
            url_schemes: ["http", "https", "mailto"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            include_registry_known: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub backend: String,
    pub file_path: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
    pub auto_revert: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            auto_revert: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub timezone: String,
    pub toast_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            toast_secs: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    pub releases_url: String,
    pub timeout_secs: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            releases_url: "https://api.github.com/repos/handler-warden/handler-warden/releases/latest"
                .to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    pub activity: ActivityConfig,
    pub tracking: TrackingConfig,
    pub registry: RegistryConfig,
    pub watcher: WatcherConfig,
    pub display: DisplayConfig,
    pub updates: UpdatesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialWardenConfig {
    activity: Option<ActivityConfig>,
    tracking: Option<TrackingConfig>,
    registry: Option<RegistryConfig>,
    watcher: Option<WatcherConfig>,
    display: Option<DisplayConfig>,
    updates: Option<UpdatesConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn validate(cfg: &WardenConfig) -> Result<()> {
    if cfg.activity.retention_days == 0 {
        return Err(anyhow!("invalid activity retention: must be >= 1 day"));
    }
    if cfg.activity.max_entries == 0 {
        return Err(anyhow!("invalid activity max entries: must be >= 1"));
    }
    match cfg.registry.backend.as_str() {
        "auto" | "xdg" | "file" => {}
        other => {
            return Err(anyhow!(
                "invalid registry backend `{other}`: use `auto`, `xdg` or `file`"
            ));
        }
    }
    if cfg.watcher.poll_interval_secs == 0 {
        return Err(anyhow!(
            "invalid watcher poll interval: must be >= 1 second"
        ));
    }
    if cfg.display.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(anyhow!(
            "invalid display timezone `{}`: use an IANA name such as `Europe/Berlin`",
            cfg.display.timezone
        ));
    }
    if cfg.display.toast_secs == 0 {
        return Err(anyhow!("invalid toast duration: must be >= 1 second"));
    }
    if cfg.updates.timeout_secs == 0 {
        return Err(anyhow!("invalid update check timeout: must be >= 1 second"));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("WARDEN_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let base = dirs::config_dir()?;
    Some(base.join("warden").join("warden.toml"))
}

fn merge_file_config(base: &mut WardenConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse warden config {}: {err}", path.display()))
}

fn merge_toml(base: &mut WardenConfig, raw: &str) -> Result<()> {
    let parsed: PartialWardenConfig = toml::from_str(raw)?;
    if let Some(activity) = parsed.activity {
        base.activity = activity;
    }
    if let Some(tracking) = parsed.tracking {
        base.tracking = tracking;
    }
    if let Some(registry) = parsed.registry {
        base.registry = registry;
    }
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if let Some(display) = parsed.display {
        base.display = display;
    }
    if let Some(updates) = parsed.updates {
        base.updates = updates;
    }
    Ok(())
}

pub fn load_config() -> Result<WardenConfig> {
    let mut cfg = WardenConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.activity.retention_days =
        env_or_u64("WARDEN_ACTIVITY_RETENTION_DAYS", cfg.activity.retention_days);
    cfg.activity.max_entries = env_or_u64(
        "WARDEN_ACTIVITY_MAX_ENTRIES",
        cfg.activity.max_entries as u64,
    ) as usize;
    cfg.tracking.file_types = env_or_csv("WARDEN_TRACK_FILE_TYPES", &cfg.tracking.file_types);
    cfg.tracking.url_schemes = env_or_csv("WARDEN_TRACK_URL_SCHEMES", &cfg.tracking.url_schemes);
    cfg.tracking.include_registry_known = env_or_bool(
        "WARDEN_TRACK_REGISTRY_KNOWN",
        cfg.tracking.include_registry_known,
    );
    cfg.registry.backend = env_or_string("WARDEN_REGISTRY", &cfg.registry.backend);
    cfg.registry.file_path =
        env_or_optional_string("WARDEN_REGISTRY_FILE", cfg.registry.file_path.clone());
    cfg.watcher.poll_interval_secs =
        env_or_u64("WARDEN_POLL_INTERVAL_SECS", cfg.watcher.poll_interval_secs);
    cfg.watcher.auto_revert = env_or_bool("WARDEN_AUTO_REVERT", cfg.watcher.auto_revert);
    cfg.display.timezone = env_or_string("WARDEN_TIMEZONE", &cfg.display.timezone);
    cfg.display.toast_secs = env_or_u64("WARDEN_TOAST_SECS", cfg.display.toast_secs);
    cfg.updates.releases_url = env_or_string("WARDEN_RELEASES_URL", &cfg.updates.releases_url);
    cfg.updates.timeout_secs =
        env_or_u64("WARDEN_UPDATE_TIMEOUT_SECS", cfg.updates.timeout_secs);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = WardenConfig::default();
        validate(&cfg).expect("defaults are valid");
        assert_eq!(cfg.activity.retention_days, 30);
        assert_eq!(cfg.activity.max_entries, 100);
        assert_eq!(cfg.display.toast_secs, 4);
    }

    #[test]
    fn partial_file_replaces_only_named_sections() {
        let mut cfg = WardenConfig::default();
        merge_toml(
            &mut cfg,
            r#"
[watcher]
poll_interval_secs = 5
auto_revert = true
"#,
        )
        .expect("merge");
        assert_eq!(cfg.watcher.poll_interval_secs, 5);
        assert!(cfg.watcher.auto_revert);
        assert_eq!(cfg.activity.max_entries, 100);
        assert_eq!(cfg.registry.backend, "auto");
    }

    #[test]
    fn rejects_unknown_backend_and_timezone() {
        let mut cfg = WardenConfig::default();
        cfg.registry.backend = "gconf".into();
        assert!(validate(&cfg).is_err());

        let mut cfg = WardenConfig::default();
        cfg.display.timezone = "Mars/Olympus".into();
        assert!(validate(&cfg).is_err());
    }
}
