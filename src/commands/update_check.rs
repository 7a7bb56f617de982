use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

use crate::commands::CommandReport;
use crate::warden::config::load_config;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let core = raw.trim().trim_start_matches(['v', 'V']);
    let core = core.split(['-', '+']).next()?;
    core.split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// True when `latest` is strictly newer than `current`. Missing trailing
/// components count as zero.
fn is_newer(latest: &str, current: &str) -> Option<bool> {
    let mut latest = parse_version(latest)?;
    let mut current = parse_version(current)?;
    let width = latest.len().max(current.len());
    latest.resize(width, 0);
    current.resize(width, 0);
    Some(latest > current)
}

fn latest_tag(json: &Value) -> Option<String> {
    json.get("tag_name")
        .or_else(|| json.get("version"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn fetch_latest(url: &str, timeout_secs: u64) -> Result<String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let response = client.get(url).send()?;
    if !response.status().is_success() {
        anyhow::bail!("release lookup failed with status {}", response.status());
    }
    let json: Value = response.json()?;
    latest_tag(&json).context("release response missing tag_name")
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("update-check");
    let cfg = load_config()?;
    report.detail(format!("current={CURRENT_VERSION}"));
    report.detail(format!("source={}", cfg.updates.releases_url));

    let latest = match fetch_latest(&cfg.updates.releases_url, cfg.updates.timeout_secs) {
        Ok(latest) => latest,
        Err(err) => {
            report.issue(format!("update check failed: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("latest={latest}"));
    match is_newer(&latest, CURRENT_VERSION) {
        Some(true) => report.detail("update_available=true"),
        Some(false) => report.detail("update_available=false"),
        None => report.issue(format!("unrecognized release version {latest}")),
    }
    Ok(report)
}
