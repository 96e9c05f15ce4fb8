//! Append-only JSONL audit trail for hook decisions.
//!
//! One compact JSON object per line, keys sorted, one file per UTC day
//! (`audit-YYYY-MM-DD.log`).

use crate::config::DesConfig;
use crate::error::Result;
use crate::io;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const AUDIT_LOG_DIR_ENV: &str = "DES_AUDIT_LOG_DIR";

/// Working directories that never receive a project-local log directory.
const SYSTEM_DIRS: &[&str] = &["/", "/usr", "/bin", "/etc", "/var", "/tmp"];

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub mod events {
    pub const HOOK_INVOKED: &str = "HOOK_INVOKED";
    pub const HOOK_COMPLETED: &str = "HOOK_COMPLETED";
    pub const HOOK_ERROR: &str = "HOOK_ERROR";
    pub const HOOK_PROTOCOL_ANOMALY: &str = "HOOK_PROTOCOL_ANOMALY";

    pub const HOOK_PRE_TOOL_USE_ALLOWED: &str = "HOOK_PRE_TOOL_USE_ALLOWED";
    pub const HOOK_PRE_TOOL_USE_BLOCKED: &str = "HOOK_PRE_TOOL_USE_BLOCKED";

    pub const HOOK_SUBAGENT_STOP_PASSED: &str = "HOOK_SUBAGENT_STOP_PASSED";
    pub const HOOK_SUBAGENT_STOP_FAILED: &str = "HOOK_SUBAGENT_STOP_FAILED";
    pub const HOOK_TRANSCRIPT_ERROR: &str = "HOOK_TRANSCRIPT_ERROR";
    pub const HOOK_TRANSCRIPT_NO_MARKERS: &str = "HOOK_TRANSCRIPT_NO_MARKERS";

    pub const HOOK_POST_TOOL_USE_INJECTED: &str = "HOOK_POST_TOOL_USE_INJECTED";
    pub const HOOK_POST_TOOL_USE_PASSTHROUGH: &str = "HOOK_POST_TOOL_USE_PASSTHROUGH";

    pub const HOOK_PRE_WRITE_ALLOWED: &str = "HOOK_PRE_WRITE_ALLOWED";
    pub const HOOK_PRE_WRITE_BLOCKED: &str = "HOOK_PRE_WRITE_BLOCKED";

    pub const LOG_INTEGRITY_CORRECTED: &str = "LOG_INTEGRITY_CORRECTED";
    pub const LOG_INTEGRITY_WARNING: &str = "LOG_INTEGRITY_WARNING";

    pub const COMMIT_VERIFIED: &str = "COMMIT_VERIFIED";
    pub const COMMIT_NOT_VERIFIED: &str = "COMMIT_NOT_VERIFIED";
    pub const SCOPE_VIOLATION: &str = "SCOPE_VIOLATION";
}

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_type: String,
    pub timestamp: String,
    pub feature_name: Option<String>,
    pub step_id: Option<String>,
    pub hook_id: Option<String>,
    pub data: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: timestamp.into(),
            feature_name: None,
            step_id: None,
            hook_id: None,
            data: Map::new(),
        }
    }

    pub fn feature(mut self, feature_name: impl Into<String>) -> Self {
        self.feature_name = Some(feature_name.into());
        self
    }

    pub fn step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn hook(mut self, hook_id: Option<&str>) -> Self {
        self.hook_id = hook_id.map(str::to_string);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Insert only when a value is present.
    pub fn with_opt<T: Into<Value>>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Flatten into the on-disk record. Event data never overrides the
    /// envelope fields.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = self.data.clone();
        record.insert("event".into(), Value::from(self.event_type.as_str()));
        record.insert("timestamp".into(), Value::from(self.timestamp.as_str()));
        if let Some(f) = &self.feature_name {
            record.insert("feature_name".into(), Value::from(f.as_str()));
        }
        if let Some(s) = &self.step_id {
            record.insert("step_id".into(), Value::from(s.as_str()));
        }
        if let Some(h) = &self.hook_id {
            record.insert("hook_id".into(), Value::from(h.as_str()));
        }
        record
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

pub trait AuditLogWriter {
    fn log_event(&self, event: &AuditEvent) -> Result<()>;
}

pub trait AuditLogReader {
    /// Most recent entry matching every provided filter.
    fn read_last_entry(
        &self,
        event_type: Option<&str>,
        feature_name: Option<&str>,
        step_id: Option<&str>,
    ) -> Option<Map<String, Value>>;
}

// ---------------------------------------------------------------------------
// Directory resolution
// ---------------------------------------------------------------------------

/// Resolve the audit log directory.
///
/// Priority: explicit dir, `DES_AUDIT_LOG_DIR`, `audit_log_dir` in
/// `.nwave/des-config.json`, `<cwd>/.nwave/des/logs`, `~/.claude/des/logs`.
/// The project-local choice is skipped when `cwd` is the home directory or
/// a system directory.
pub fn resolve_log_dir(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(AUDIT_LOG_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(dir) = DesConfig::load(cwd).audit_log_dir {
        return dir;
    }
    let home = home::home_dir();
    let is_home = home.as_deref() == Some(cwd);
    let is_system = cwd.to_str().is_some_and(|s| SYSTEM_DIRS.contains(&s));
    if !is_home && !is_system {
        return cwd.join(crate::paths::DES_LOGS_DIR);
    }
    home.unwrap_or_else(|| cwd.to_path_buf())
        .join(crate::paths::CLAUDE_AUDIT_LOGS_DIR)
}

pub fn log_file_for(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("audit-{}.log", day.format("%Y-%m-%d")))
}

// ---------------------------------------------------------------------------
// JSONL adapters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JsonlAuditLogWriter {
    log_dir: PathBuf,
}

impl JsonlAuditLogWriter {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

impl AuditLogWriter for JsonlAuditLogWriter {
    fn log_event(&self, event: &AuditEvent) -> Result<()> {
        let line = serde_json::to_string(&Value::Object(event.to_record()))?;
        let file = log_file_for(&self.log_dir, Utc::now().date_naive());
        io::append_line(&file, &line)
    }
}

#[derive(Debug, Clone)]
pub struct JsonlAuditLogReader {
    log_dir: PathBuf,
}

impl JsonlAuditLogReader {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }
}

fn field_matches(entry: &Map<String, Value>, key: &str, want: Option<&str>) -> bool {
    match want {
        Some(w) if !w.is_empty() => entry.get(key).and_then(Value::as_str) == Some(w),
        _ => true,
    }
}

impl AuditLogReader for JsonlAuditLogReader {
    fn read_last_entry(
        &self,
        event_type: Option<&str>,
        feature_name: Option<&str>,
        step_id: Option<&str>,
    ) -> Option<Map<String, Value>> {
        let file = log_file_for(&self.log_dir, Utc::now().date_naive());
        let text = std::fs::read_to_string(file).ok()?;
        text.lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str::<Map<String, Value>>(l).ok())
            .find(|entry| {
                field_matches(entry, "event", event_type)
                    && field_matches(entry, "feature_name", feature_name)
                    && field_matches(entry, "step_id", step_id)
            })
    }
}

/// Discards every event. Used when audit logging is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditLogWriter;

impl AuditLogWriter for NullAuditLogWriter {
    fn log_event(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }
}

/// Writer honoring the project's `audit_logging_enabled` setting.
pub fn create_audit_writer(cwd: &Path) -> Box<dyn AuditLogWriter> {
    if DesConfig::load(cwd).audit_enabled() {
        Box::new(JsonlAuditLogWriter::new(resolve_log_dir(None, cwd)))
    } else {
        Box::new(NullAuditLogWriter)
    }
}

pub fn create_audit_reader(cwd: &Path) -> JsonlAuditLogReader {
    JsonlAuditLogReader::new(resolve_log_dir(None, cwd))
}

// ---------------------------------------------------------------------------
// In-memory log for service tests
// ---------------------------------------------------------------------------
