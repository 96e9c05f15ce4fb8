//! Plumbing shared by the protocol adapters: stdin parsing, diagnostic audit
//! events and the production wiring of the services.

use super::signal::{self, TaskSignal};
use crate::audit::{self, events, AuditEvent, AuditLogReader, AuditLogWriter};
use crate::clock::{audit_timestamp, Clock, SystemClock};
use crate::error::{DesError, Result};
use crate::git::{CommitVerifier, GitCommitVerifier, GitScopeChecker, ScopeChecker};
use crate::markers::DesMarkers;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Handlers slower than this get `slow_hook: true` on HOOK_COMPLETED.
const SLOW_HOOK_MS: f64 = 5000.0;

/// What a hook invocation writes back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HookResponse {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: i32,
}

impl HookResponse {
    pub fn json(value: Value, exit_code: i32) -> Self {
        Self {
            stdout: Some(value.to_string()),
            stderr: None,
            exit_code,
        }
    }

    pub fn stderr(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: None,
            stderr: Some(message.into()),
            exit_code,
        }
    }

    /// Parsed stdout, for assertions.
    pub fn body(&self) -> Value {
        self.stdout
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null)
    }
}

fn decision_name(exit_code: i32) -> &'static str {
    match exit_code {
        0 => "allow",
        2 => "block",
        _ => "error",
    }
}

pub(crate) enum Stdin {
    Empty,
    /// `Invalid JSON: <detail>`.
    Invalid(String),
    Json(Value),
}

pub(crate) fn parse_stdin(raw: &str) -> Stdin {
    if raw.trim().is_empty() {
        return Stdin::Empty;
    }
    match serde_json::from_str(raw) {
        Ok(v) => Stdin::Json(v),
        Err(e) => Stdin::Invalid(format!("Invalid JSON: {e}")),
    }
}

pub(crate) fn str_at<'v>(v: &'v Value, key: &str) -> &'v str {
    v.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Integer field that may arrive as a number or a numeric string.
pub(crate) fn u64_at(v: &Value, key: &str) -> Option<u64> {
    match v.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Correlation data gathered while a handler runs, reported on HOOK_COMPLETED.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    pub task_correlation_id: Option<String>,
    pub turns_used: Option<u64>,
    pub tokens_used: Option<u64>,
}

/// Services and adapters needed to answer hook invocations for one project.
pub struct HookRuntime {
    /// Directory holding `.nwave/des/` signal and session files.
    pub root: PathBuf,
    pub clock: Box<dyn Clock>,
    pub audit: Box<dyn AuditLogWriter>,
    pub audit_reader: Box<dyn AuditLogReader>,
    pub commits: Box<dyn CommitVerifier>,
    pub scope: Box<dyn ScopeChecker>,
}

impl HookRuntime {
    /// Production wiring: system clock, git adapters, JSONL audit log.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            clock: Box::new(SystemClock),
            audit: audit::create_audit_writer(root),
            audit_reader: Box::new(audit::create_audit_reader(root)),
            commits: Box::new(GitCommitVerifier),
            scope: Box::new(GitScopeChecker),
        }
    }

    pub(crate) fn event(&self, event_type: &str) -> AuditEvent {
        AuditEvent::new(event_type, audit_timestamp(self.clock.now_utc()))
    }

    /// Audit failures never change a hook's answer.
    pub(crate) fn emit(&self, event: AuditEvent) {
        let _ = self.audit.log_event(&event);
    }

    pub(crate) fn log_invoked(&self, handler: &str, hook_id: &str, summary: Value) {
        self.emit(
            self.event(events::HOOK_INVOKED)
                .hook(Some(hook_id))
                .with("handler", handler)
                .with("input_summary", summary),
        );
    }

    pub(crate) fn log_anomaly(&self, handler: &str, kind: &str, detail: &str, fallback: &str) {
        self.emit(
            self.event(events::HOOK_PROTOCOL_ANOMALY)
                .with("handler", handler)
                .with("anomaly_type", kind)
                .with("detail", detail)
                .with("fallback_action", fallback),
        );
    }

    /// Parse stdin, recording protocol anomalies. `invalid_fallback` names
    /// what the handler does with malformed JSON.
    pub(crate) fn read_stdin(&self, handler: &str, raw: &str, invalid_fallback: &str) -> Stdin {
        let parsed = parse_stdin(raw);
        match &parsed {
            Stdin::Empty => self.log_anomaly(
                handler,
                "empty_stdin",
                "No input data received on stdin",
                "allow",
            ),
            Stdin::Invalid(detail) => {
                self.log_anomaly(handler, "json_parse_error", detail, invalid_fallback)
            }
            Stdin::Json(_) => {}
        }
        parsed
    }

    /// Run `body` with HOOK_COMPLETED bookkeeping. Errors are audited as
    /// HOOK_ERROR and answered with `on_error`.
    pub(crate) fn guarded<F>(
        &self,
        handler: &str,
        body: F,
        on_error: impl FnOnce(&DesError) -> HookResponse,
    ) -> HookResponse
    where
        F: FnOnce(&str, &mut Trace) -> Result<HookResponse>,
    {
        let hook_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut trace = Trace::default();
        let response = match body(&hook_id, &mut trace) {
            Ok(r) => r,
            Err(e) => {
                self.emit(
                    self.event(events::HOOK_ERROR)
                        .hook(Some(hook_id.as_str()))
                        .with("handler", handler)
                        .with("error", e.to_string())
                        .with("error_type", e.kind()),
                );
                on_error(&e)
            }
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut event = self
            .event(events::HOOK_COMPLETED)
            .hook(Some(hook_id.as_str()))
            .with("handler", handler)
            .with("exit_code", response.exit_code)
            .with("decision", decision_name(response.exit_code))
            .with("duration_ms", duration_ms)
            .with_opt("task_correlation_id", trace.task_correlation_id)
            .with_opt("turns_used", trace.turns_used)
            .with_opt("tokens_used", trace.tokens_used);
        if duration_ms > SLOW_HOOK_MS {
            event = event.with("slow_hook", true);
        }
        self.emit(event);
        response
    }

    /// Record that a DES task was dispatched. Returns its correlation id.
    pub(crate) fn start_des_task(&self, prompt: &str) -> Option<String> {
        let markers = DesMarkers::parse(prompt);
        let signal = TaskSignal::new(
            markers.project_id.as_deref().unwrap_or_default(),
            markers.step_id.as_deref().unwrap_or_default(),
            self.clock.now_utc(),
        );
        // A missing signal only costs the stop hook its task start time.
        let _ = signal::create(&self.root, &signal);
        signal.task_correlation_id
    }

    /// Drop the task's signal files. A file that cannot be removed is
    /// audited as HOOK_ERROR and the stop check still runs.
    pub(crate) fn end_des_task(
        &self,
        handler: &str,
        hook_id: &str,
        project_id: &str,
        step_id: &str,
    ) {
        if let Err(e) = signal::remove(&self.root, project_id, step_id) {
            self.emit(
                self.event(events::HOOK_ERROR)
                    .hook(Some(hook_id))
                    .with("handler", handler)
                    .with("stage", "signal_cleanup")
                    .with("error", e.to_string())
                    .with("error_type", e.kind()),
            );
        }
    }
}

/// Summary fields copied from the hook input into HOOK_INVOKED.
pub(crate) fn summary(pairs: &[(&str, Value)]) -> Value {
    let map: Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Value::Object(map)
}

pub(crate) fn field(v: &Value, key: &str) -> Value {
    v.get(key).cloned().unwrap_or(Value::Null)
}

pub(crate) fn empty_object() -> Value {
    json!({})
}
