use crate::warden::paths::WardenPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(
    paths: &WardenPaths,
    at_epoch_ms: u64,
    phase: &str,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: at_epoch_ms / 1000,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_log_file();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Audit failures must never fail the operation being audited.
pub fn record(paths: &WardenPaths, at_epoch_ms: u64, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, at_epoch_ms, phase, status, message) {
        crate::warden::warn::emit(
            "AUDIT_WRITE_FAILED",
            phase,
            "append",
            "audit.log",
            "audit log not writable",
            &format!("{err:#}"),
        );
    }
}

pub fn read_events(paths: &WardenPaths) -> Result<Vec<AuditEvent>> {
    let path = paths.audit_log_file();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut out = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("failed to parse audit line in {}", path.display()))?;
        out.push(event);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_append_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = WardenPaths::under(tmp.path());
        append_event(&paths, 1_760_000_000_500, "detect", "ok", "2 external changes")
            .expect("first");
        record(&paths, 1_760_000_001_999, "set", "ok", "file_type:.json -> org.b");

        let events = read_events(&paths).expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, "detect");
        assert_eq!(events[0].at_epoch_secs, 1_760_000_000);
        assert_eq!(events[1].at_epoch_secs, 1_760_000_001);
        assert_eq!(events[1].message, "file_type:.json -> org.b");
    }
}
