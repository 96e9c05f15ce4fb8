use crate::audit::{events, AuditLogReader};
use serde_json::{Map, Value};

pub const DES_MARKER_REMINDER: &str = "
MANDATORY: Include these DES markers in the Task prompt:
<!-- DES-VALIDATION : required -->
<!-- DES-PROJECT-ID : {project-id} -->
<!-- DES-STEP-ID : {step-id} -->

Without these markers, DES validation is bypassed and the step won't be verified.
Read nWave/tasks/nw/execute.md for the full DES Prompt Template with all 9 mandatory sections.";

/// Kind of context injected back into the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Continuation,
    FailureNotification,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Continuation => "continuation",
            ContextKind::FailureNotification => "failure_notification",
        }
    }
}

/// Looks at the latest subagent-stop outcome and tells the orchestrator what
/// to do next.
pub struct PostToolUseService<'a> {
    reader: &'a dyn AuditLogReader,
}

impl<'a> PostToolUseService<'a> {
    pub fn new(reader: &'a dyn AuditLogReader) -> Self {
        Self { reader }
    }

    pub fn additional_context(&self, is_des_task: bool) -> Option<(ContextKind, String)> {
        let passed = self
            .reader
            .read_last_entry(Some(events::HOOK_SUBAGENT_STOP_PASSED), None, None);
        let failed = self
            .reader
            .read_last_entry(Some(events::HOOK_SUBAGENT_STOP_FAILED), None, None);

        let passed_ts = passed.as_ref().map_or("", |e| str_field(e, "timestamp"));
        let failed_ts = failed.as_ref().map_or("", |e| str_field(e, "timestamp"));

        // Timestamps share one fixed format, so string order is time order.
        if let Some(entry) = passed.as_ref().filter(|_| passed_ts >= failed_ts) {
            return is_des_task.then(|| (ContextKind::Continuation, continuation(entry)));
        }
        let entry = failed.filter(|e| {
            e.get("allowed_despite_failure")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })?;
        Some((ContextKind::FailureNotification, failure(&entry, is_des_task)))
    }
}

fn str_field<'e>(entry: &'e Map<String, Value>, key: &str) -> &'e str {
    entry.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn name_or_unknown<'e>(entry: &'e Map<String, Value>, key: &str) -> &'e str {
    entry.get(key).and_then(Value::as_str).unwrap_or("unknown")
}

fn continuation(entry: &Map<String, Value>) -> String {
    format!(
        "DES STEP COMPLETED [{}/{}]\nStatus: PASSED\n\n\
Continue the DELIVER workflow. Dispatch the next step.\n{DES_MARKER_REMINDER}",
        name_or_unknown(entry, "feature_name"),
        name_or_unknown(entry, "step_id"),
    )
}

fn failure(entry: &Map<String, Value>, is_des_task: bool) -> String {
    let errors: Vec<&str> = entry
        .get("validation_errors")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let error_text = if errors.is_empty() {
        "Unknown validation failure".to_string()
    } else {
        errors.join("; ")
    };
    let base = format!(
        "DES STEP INCOMPLETE [{}/{}]\nStatus: FAILED\nErrors: {error_text}\n\n\
The sub-agent failed to complete all required TDD phases.\n\
You MUST RE-DISPATCH the agent to fix the missing work.",
        name_or_unknown(entry, "feature_name"),
        name_or_unknown(entry, "step_id"),
    );
    if is_des_task {
        format!("{base}\n{DES_MARKER_REMINDER}")
    } else {
        base
    }
}
