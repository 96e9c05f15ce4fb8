//! Gatekeeping rules applied to Task invocations and file writes.

use crate::markers::DesMarkers;
use regex::Regex;
use std::sync::OnceLock;

/// Outcome of a single policy check. `None` means the check passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub reason: String,
    pub recovery_suggestions: Vec<String>,
}

impl Violation {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recovery_suggestions: Vec::new(),
        }
    }

    fn with_recovery(mut self, steps: &[&str]) -> Self {
        self.recovery_suggestions = steps.iter().map(|s| s.to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// max_turns
// ---------------------------------------------------------------------------

pub const MIN_TURNS: i64 = 10;
pub const MAX_TURNS: i64 = 100;

pub const MISSING_MAX_TURNS: &str = "MISSING_MAX_TURNS: The max_turns parameter is required for all Task invocations. \
Add max_turns parameter (e.g., max_turns=30) to prevent unbounded execution.";

/// `max_turns` arrives as raw JSON so non-integers can be reported verbatim.
pub fn check_max_turns(max_turns: Option<&serde_json::Value>) -> Option<Violation> {
    let value = match max_turns {
        None | Some(serde_json::Value::Null) => return Some(Violation::new(MISSING_MAX_TURNS)),
        Some(v) => v,
    };
    match value.as_i64() {
        Some(n) if (MIN_TURNS..=MAX_TURNS).contains(&n) => None,
        _ => Some(Violation::new(format!(
            "INVALID_MAX_TURNS: max_turns must be an integer between {MIN_TURNS} and {MAX_TURNS} (got: {}). \
Recommended values: quick edit=15, background task=25, standard=30, research=35, complex=50.",
            display_json(value)
        ))),
    }
}

fn display_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// DES enforcement
// ---------------------------------------------------------------------------

pub const DES_MARKER: &str = "DES-VALIDATION : required";
pub const EXEMPT_MARKER: &str = "DES-ENFORCEMENT : exempt";

fn step_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{2}-\d{2}\b").unwrap())
}

fn date_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-$").unwrap())
}

/// First step-id looking token (`NN-NN`) that is not the month-day tail of
/// a date such as `2026-02-09`.
pub fn find_step_id(prompt: &str) -> Option<&str> {
    let re = step_id_re();
    let mut pos = 0;
    while let Some(m) = re.find_at(prompt, pos) {
        if !date_prefix_re().is_match(&prompt[..m.start()]) {
            return Some(m.as_str());
        }
        // Retry one character later so overlapping candidates are not skipped.
        pos = m.start() + prompt[m.start()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// A prompt that names a step id is doing step work and must carry DES markers.
pub fn check_des_enforcement(prompt: &str) -> Option<Violation> {
    if prompt.contains(DES_MARKER) || prompt.contains(EXEMPT_MARKER) {
        return None;
    }
    let step_id = find_step_id(prompt)?;
    Some(
        Violation::new(format!(
            "DES_MARKERS_MISSING: Task prompt contains step-id pattern ({step_id}) \
but lacks DES markers. Step execution tasks require DES monitoring."
        ))
        .with_recovery(&[
            "Add DES markers to the Task prompt:",
            "<!-- DES-VALIDATION : required -->",
            "<!-- DES-PROJECT-ID : {project-id} -->",
            "<!-- DES-STEP-ID : {step-id} -->",
            "Read ~/.claude/commands/nw/execute.md for the full template.",
            "If this is NOT step execution, add: <!-- DES-ENFORCEMENT : exempt -->",
        ]),
    )
}

// ---------------------------------------------------------------------------
// Marker completeness
// ---------------------------------------------------------------------------

pub fn check_marker_completeness(markers: &DesMarkers) -> Option<Violation> {
    if !markers.is_des_task {
        return None;
    }
    let mut missing = Vec::new();
    if markers.project_id.is_none() {
        missing.push("DES-PROJECT-ID");
    }
    if markers.step_id.is_none() && !markers.is_orchestrator_mode {
        missing.push("DES-STEP-ID");
    }
    if missing.is_empty() {
        return None;
    }
    Some(
        Violation::new(format!(
            "DES_MARKERS_INCOMPLETE: {} missing",
            missing.join(", ")
        ))
        .with_recovery(&[
            "Add the missing DES markers to the Task prompt:",
            "<!-- DES-PROJECT-ID : {project-id} -->",
            "<!-- DES-STEP-ID : {step-id} -->",
            "Read ~/.claude/commands/nw/execute.md for the full template.",
        ]),
    )
}

// ---------------------------------------------------------------------------
// Session guard
// ---------------------------------------------------------------------------

const PROTECTED_PATTERNS: &[&str] = &["src/", "tests/"];
const ALLOWED_PATTERNS: &[&str] = &["docs/feature/", ".nwave/", ".develop-progress"];

pub const SESSION_GUARD_REASON: &str = "Source write blocked during deliver session. \
Source/test files must be written by a DES-monitored software-crafter subagent, \
not directly by the orchestrator. Delegate this work via Task with DES markers.";

/// During a DELIVER session, source and test files may only be written while a
/// DES-monitored subagent is running. Orchestration artifacts stay writable.
pub fn check_session_guard(
    file_path: &str,
    session_active: bool,
    des_task_active: bool,
) -> Option<Violation> {
    if !session_active
        || des_task_active
        || ALLOWED_PATTERNS.iter().any(|p| file_path.contains(p))
        || !PROTECTED_PATTERNS.iter().any(|p| file_path.contains(p))
    {
        return None;
    }
    Some(Violation::new(SESSION_GUARD_REASON))
}
