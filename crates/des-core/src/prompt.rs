//! Pre-invocation validation of DES Task prompts.
//!
//! A DES prompt must carry the `DES-VALIDATION : required` marker, the nine
//! mandatory `# SECTION` headings, a mention of every TDD phase, and (when it
//! embeds one) a consistent phase execution log.

use crate::schema::TddSchema;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

pub const MANDATORY_SECTIONS: &[&str] = &[
    "DES_METADATA",
    "AGENT_IDENTITY",
    "TASK_CONTEXT",
    "TDD_PHASES",
    "QUALITY_GATES",
    "OUTCOME_RECORDING",
    "RECORDING_INTEGRITY",
    "BOUNDARY_RULES",
    "TIMEOUT_INSTRUCTION",
];

fn section_guidance(section: &str) -> Option<&'static str> {
    Some(match section {
        "DES_METADATA" => "Add DES_METADATA section with step file path and command name",
        "AGENT_IDENTITY" => "Add AGENT_IDENTITY section specifying which agent executes this step",
        "TASK_CONTEXT" => "Add TASK_CONTEXT section describing what needs to be implemented",
        "TDD_PHASES" => {
            "Add TDD_PHASES section listing all 5 phases: PREPARE, RED_ACCEPTANCE, RED_UNIT, GREEN, COMMIT"
        }
        "QUALITY_GATES" => "Add QUALITY_GATES section defining validation criteria (G1-G6)",
        "OUTCOME_RECORDING" => {
            "Add OUTCOME_RECORDING section describing how to track phase completion"
        }
        "RECORDING_INTEGRITY" => {
            "Add RECORDING_INTEGRITY section with valid skip prefixes \
(NOT_APPLICABLE, BLOCKED_BY_DEPENDENCY, APPROVED_SKIP, CHECKPOINT_PENDING) \
and anti-fraud rules. See ~/.claude/commands/nw/execute.md"
        }
        "BOUNDARY_RULES" => "Add BOUNDARY_RULES section specifying which files can be modified",
        "TIMEOUT_INSTRUCTION" => "Add TIMEOUT_INSTRUCTION section with turn budget guidance",
        _ => return None,
    })
}

const EXECUTION_LOG_SECTIONS: &[&str] = &[
    "# EXECUTION_LOG_STATUS",
    "# EXECUTION_LOG_ISSUE",
    "# EXECUTION_LOG_PROBLEM",
    "# EXECUTION_LOG_ERRORS",
    "# EXECUTION_LOG_WITH_SKIP",
    "# EXECUTION_LOG_COMPLETE",
];

const LOG_STATUSES: &[&str] = &["EXECUTED", "SKIPPED", "IN_PROGRESS", "NOT_EXECUTED"];

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub task_invocation_allowed: bool,
    pub duration_ms: f64,
    pub recovery_guidance: Vec<String>,
}

// ---------------------------------------------------------------------------
// Execution log embedded in a prompt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedPhase {
    pub phase_name: String,
    pub status: String,
    pub outcome: Option<String>,
    pub blocked_by: Option<String>,
}

impl LoggedPhase {
    fn new(phase_name: &str, status: &str) -> Self {
        Self {
            phase_name: phase_name.to_string(),
            status: status.to_string(),
            outcome: None,
            blocked_by: None,
        }
    }
}

fn narrative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Phase\s+(\w+)\s+status:\s+(\w+)").unwrap())
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"Phase\s+(\w+):\s+status=(\w+)(?:,\s+outcome=(\w+))?(?:,\s+blocked_by=([^\n,]+))?",
        )
        .unwrap()
    })
}

fn list_heads() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        LOG_STATUSES
            .iter()
            .map(|s| (*s, Regex::new(&format!(r"\b{s}:\s+")).unwrap()))
            .collect()
    })
}

fn phase_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9_\-]+$").unwrap())
}

fn section_content<'a>(prompt: &'a str, marker: &str) -> Option<&'a str> {
    let start = prompt.find(marker)? + marker.len();
    let rest = &prompt[start..];
    Some(match rest.find("\n#") {
        Some(end) => &rest[..end],
        None => rest,
    })
}

fn parse_narrative(section: &str) -> Vec<LoggedPhase> {
    narrative_re()
        .captures_iter(section)
        .map(|c| LoggedPhase::new(&c[1], &c[2]))
        .collect()
}

/// `EXECUTED: PREPARE, RED_UNIT` style lists. A list ends at a newline or at
/// the next status keyword.
fn parse_list(section: &str) -> Vec<LoggedPhase> {
    let mut out = Vec::new();
    for (status, head) in list_heads() {
        for m in head.find_iter(section) {
            let tail = &section[m.end()..];
            let mut end = tail.find('\n').unwrap_or(tail.len());
            for kw in LOG_STATUSES {
                if let Some(i) = tail[..end].find(kw) {
                    end = end.min(i);
                }
            }
            let segment = &tail[..end];
            let allowed = |c: char| {
                c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | ',' | '-') || c.is_whitespace()
            };
            if segment.is_empty() || !segment.chars().all(allowed) {
                continue;
            }
            for name in segment.split(',').map(str::trim) {
                if !name.is_empty() && phase_token_re().is_match(name) {
                    out.push(LoggedPhase::new(name, status));
                }
            }
        }
    }
    out
}

fn parse_key_value(section: &str) -> Vec<LoggedPhase> {
    key_value_re()
        .captures_iter(section)
        .map(|c| {
            let mut phase = LoggedPhase::new(&c[1], &c[2]);
            phase.outcome = c
                .get(3)
                .map(|m| m.as_str())
                .filter(|o| !o.eq_ignore_ascii_case("null"))
                .map(str::to_string);
            phase.blocked_by = c
                .get(4)
                .map(|m| m.as_str().trim())
                .filter(|b| !b.to_ascii_lowercase().starts_with("null"))
                .map(str::to_string);
            phase
        })
        .collect()
}

/// Collect phase records from every `# EXECUTION_LOG_*` section, keeping the
/// first record per (phase, status).
pub fn extract_execution_log(prompt: &str) -> Vec<LoggedPhase> {
    let mut all = Vec::new();
    for marker in EXECUTION_LOG_SECTIONS {
        let Some(section) = section_content(prompt, marker) else {
            continue;
        };
        if section.is_empty() {
            continue;
        }
        all.extend(parse_narrative(section));
        all.extend(parse_list(section));
        all.extend(parse_key_value(section));
    }
    let mut seen = HashSet::new();
    all.into_iter()
        .filter(|p| seen.insert((p.phase_name.clone(), p.status.clone())))
        .collect()
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

fn marker_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*DES-VALIDATION\s*:\s*(\w+)\s*-->").unwrap())
}

fn shorthand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)all\s+\d+\s+phases?\s+(listed|mentioned|included|present)").unwrap()
    })
}

#[derive(Debug, Clone)]
pub struct TemplateValidator {
    schema: TddSchema,
}

impl TemplateValidator {
    pub fn new(schema: TddSchema) -> Self {
        Self { schema }
    }

    pub fn validate_prompt(&self, prompt: &str) -> ValidationResult {
        let started = Instant::now();

        let marker_errors = check_marker(prompt);
        let section_errors = check_sections(prompt);
        let phase_errors = self.check_phases(prompt);
        let log_errors = self.check_execution_log(&extract_execution_log(prompt));

        let mut recovery_guidance: Vec<String> = MANDATORY_SECTIONS
            .iter()
            .filter(|s| section_errors.iter().any(|e| e.contains(&format!("'{s}'"))))
            .filter_map(|s| section_guidance(s))
            .map(|g| format!("FIX: {g}"))
            .collect();
        recovery_guidance.extend(log_errors.iter().filter_map(|e| log_guidance(e)));

        let errors: Vec<String> = marker_errors
            .into_iter()
            .chain(section_errors)
            .chain(phase_errors)
            .chain(log_errors)
            .collect();
        let passed = errors.is_empty();
        ValidationResult {
            status: if passed {
                ValidationStatus::Passed
            } else {
                ValidationStatus::Failed
            },
            errors,
            task_invocation_allowed: passed,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            recovery_guidance,
        }
    }

    fn check_phases(&self, prompt: &str) -> Vec<String> {
        if shorthand_re().is_match(prompt) {
            return Vec::new();
        }
        self.schema
            .tdd_phases
            .iter()
            .filter(|phase| !phase_mentioned(phase, prompt))
            .map(|phase| format!("INCOMPLETE: TDD phase '{phase}' not mentioned"))
            .collect()
    }

    /// Consistency of an execution log pasted into the prompt. An empty log
    /// is not an error: prompts usually predate execution.
    pub fn check_execution_log(&self, log: &[LoggedPhase]) -> Vec<String> {
        let mut errors = Vec::new();
        if log.is_empty() {
            return errors;
        }
        let expected = self.schema.total_phases();
        if log.len() != expected {
            errors.push(format!(
                "INVALID: Phase log has {} phases, expected {expected} phases from schema",
                log.len()
            ));
        }
        let present: HashSet<&str> = log.iter().map(|p| p.phase_name.as_str()).collect();
        let mut missing: Vec<&str> = self
            .schema
            .tdd_phases
            .iter()
            .map(String::as_str)
            .filter(|p| !present.contains(p))
            .collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            errors.push(format!(
                "INCOMPLETE: Missing required phases: {}",
                missing.join(", ")
            ));
        }

        for p in log {
            let name = &p.phase_name;
            match p.status.as_str() {
                "IN_PROGRESS" => errors.push(format!(
                    "INCOMPLETE: Phase {name} left in IN_PROGRESS state - task may have been abandoned"
                )),
                "EXECUTED" if p.outcome.is_none() => errors.push(format!(
                    "ERROR: Phase {name} EXECUTED but missing outcome field. Must specify outcome (PASS or FAIL)"
                )),
                "SKIPPED" if p.blocked_by.as_deref().map_or(true, str::is_empty) => {
                    errors.push(format!(
                        "ERROR: Phase {name} SKIPPED but missing blocked_by reason. Must explain why phase was skipped"
                    ))
                }
                "NOT_EXECUTED" => errors.push(format!(
                    "ERROR: Phase {name} NOT_EXECUTED. Cannot mark task complete with unexecuted phases"
                )),
                _ => {}
            }
        }
        errors
    }
}

fn check_marker(prompt: &str) -> Vec<String> {
    match marker_value_re().captures(prompt) {
        None => vec!["INVALID_MARKER: DES-VALIDATION marker not found".to_string()],
        Some(c) if &c[1] != "required" => vec![format!(
            "INVALID_MARKER: DES-VALIDATION value must be 'required', got '{}'",
            &c[1]
        )],
        Some(_) => Vec::new(),
    }
}

fn check_sections(prompt: &str) -> Vec<String> {
    MANDATORY_SECTIONS
        .iter()
        .filter(|s| !prompt.contains(&format!("# {s}")))
        .map(|s| format!("MISSING: Mandatory section '{s}' not found"))
        .collect()
}

fn missing_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:without|missing|no)\s+(\w+)").unwrap())
}

fn missing_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"# MISSING:\s*(\S*)").unwrap())
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offsets of `word` in `line` where it stands as a whole word.
fn word_positions<'a>(line: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    let bytes = line.as_bytes();
    line.match_indices(word).map(|(i, _)| i).filter(move |&i| {
        let end = i + word.len();
        let before = i == 0 || !is_word_byte(bytes[i - 1]);
        let after = end == bytes.len() || !is_word_byte(bytes[end]);
        before && after
    })
}

/// True when `phase` only appears in a "missing" context on this line:
/// inside parentheses, after without/missing/no, or under `# MISSING:`.
fn in_missing_context(phase: &str, line: &str) -> bool {
    let open = line.find('(');
    let close = line.rfind(')');
    if let (Some(open), Some(close)) = (open, close) {
        if word_positions(line, phase).any(|i| open < i && i + phase.len() < close + 1) {
            return true;
        }
    }
    if missing_word_re()
        .captures_iter(line)
        .any(|c| c[1].eq_ignore_ascii_case(phase))
    {
        return true;
    }
    missing_heading_re()
        .captures_iter(line)
        .any(|c| c[1].starts_with(phase))
}

/// A phase counts as mentioned when at least one line names it outside a
/// "missing" context such as `(missing COMMIT)`, `without GREEN` or
/// `# MISSING: GREEN`.
fn phase_mentioned(phase: &str, prompt: &str) -> bool {
    prompt
        .lines()
        .map(str::trim)
        .filter(|line| line.contains(phase))
        .any(|line| !in_missing_context(phase, line))
}

fn phase_after(error: &str) -> Option<&str> {
    error.split("Phase ").nth(1)?.split(' ').next()
}

fn log_guidance(error: &str) -> Option<String> {
    if error.contains("IN_PROGRESS") {
        phase_after(error).map(|p| format!("FIX: Complete or rollback the IN_PROGRESS phase {p}"))
    } else if error.contains("SKIPPED") && error.to_lowercase().contains("blocked_by") {
        phase_after(error)
            .map(|p| format!("FIX: Add blocked_by reason explaining why phase {p} was skipped"))
    } else if error.contains("NOT_EXECUTED") {
        Some(
            "FIX: Cannot complete task with NOT_EXECUTED phases. \
All required phases must be EXECUTED or explicitly SKIPPED with reason"
                .to_string(),
        )
    } else if error.contains("EXECUTED") && error.to_lowercase().contains("outcome") {
        phase_after(error).map(|p| format!("FIX: Add outcome field (PASS/FAIL) to phase {p}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_prompt() -> String {
        let mut p = String::from("<!-- DES-VALIDATION : required -->\n");
        for s in MANDATORY_SECTIONS {
            p.push_str(&format!("# {s}\n"));
        }
        p.push_str("1. PREPARE\n2. RED_ACCEPTANCE\n3. RED_UNIT\n4. GREEN\n5. COMMIT\n");
        p
    }

    fn validator() -> TemplateValidator {
        TemplateValidator::new(TddSchema::default())
    }

    #[test]
    fn complete_prompt_passes() {
        let r = validator().validate_prompt(&complete_prompt());
        assert_eq!(r.status, ValidationStatus::Passed, "{:?}", r.errors);
        assert!(r.task_invocation_allowed);
        assert!(r.recovery_guidance.is_empty());
    }

    #[test]
    fn missing_marker_and_section() {
        let prompt = complete_prompt()
            .replace("<!-- DES-VALIDATION : required -->\n", "")
            .replace("# BOUNDARY_RULES\n", "");
        let r = validator().validate_prompt(&prompt);
        assert_eq!(r.errors[0], "INVALID_MARKER: DES-VALIDATION marker not found");
        assert!(r
            .errors
            .contains(&"MISSING: Mandatory section 'BOUNDARY_RULES' not found".to_string()));
        assert_eq!(
            r.recovery_guidance,
            vec!["FIX: Add BOUNDARY_RULES section specifying which files can be modified"]
        );
        assert!(!r.task_invocation_allowed);
    }

    #[test]
    fn wrong_marker_value() {
        let prompt = complete_prompt().replace(": required", ": optional");
        let r = validator().validate_prompt(&prompt);
        assert_eq!(
            r.errors,
            vec!["INVALID_MARKER: DES-VALIDATION value must be 'required', got 'optional'"]
        );
    }

    #[test]
    fn phases_in_missing_context_do_not_count() {
        let prompt = complete_prompt().replace("5. COMMIT\n", "(missing COMMIT)\nwithout COMMIT\n");
        let r = validator().validate_prompt(&prompt);
        assert_eq!(r.errors, vec!["INCOMPLETE: TDD phase 'COMMIT' not mentioned"]);
    }

    #[test]
    fn missing_context_checks_each_form() {
        assert!(in_missing_context("GREEN", "(skip GREEN for now)"));
        assert!(in_missing_context("GREEN", "ran it without green"));
        assert!(in_missing_context("GREEN", "# MISSING: GREEN"));
        assert!(!in_missing_context("GREEN", "4. GREEN"));
        assert!(!in_missing_context("GREEN", "GREEN (then refactor)"));
        assert!(!in_missing_context("RED_UNIT", "no RED_UNIT_EXTRA here"));
        assert!(phase_mentioned("GREEN", "(missing GREEN)\n4. GREEN\n"));
    }

    #[test]
    fn shorthand_accepts_all_phases() {
        let mut prompt = complete_prompt();
        for phase in ["1. PREPARE\n", "2. RED_ACCEPTANCE\n", "3. RED_UNIT\n", "4. GREEN\n", "5. COMMIT\n"] {
            prompt = prompt.replace(phase, "");
        }
        prompt.push_str("All 5 phases listed in the template.\n");
        assert!(validator().validate_prompt(&prompt).task_invocation_allowed);
    }

    #[test]
    fn extracts_three_log_formats() {
        let prompt = "# EXECUTION_LOG_STATUS\n\
Phase GREEN status: IN_PROGRESS (stalled)\n\
EXECUTED: PREPARE, RED_ACCEPTANCE\n\
NOT_EXECUTED: COMMIT\n\
Phase RED_UNIT: status=SKIPPED, outcome=null, blocked_by=NOT_APPLICABLE pure refactor\n\
# NEXT\n";
        let log = extract_execution_log(prompt);
        let pairs: Vec<(&str, &str)> = log
            .iter()
            .map(|p| (p.phase_name.as_str(), p.status.as_str()))
            .collect();
        assert!(pairs.contains(&("GREEN", "IN_PROGRESS")));
        assert!(pairs.contains(&("PREPARE", "EXECUTED")));
        assert!(pairs.contains(&("COMMIT", "NOT_EXECUTED")));
        assert!(!pairs.contains(&("COMMIT", "EXECUTED")));
        let red_unit = log.iter().find(|p| p.phase_name == "RED_UNIT").unwrap();
        assert_eq!(red_unit.outcome, None);
        assert_eq!(red_unit.blocked_by.as_deref(), Some("NOT_APPLICABLE pure refactor"));
    }

    #[test]
    fn execution_log_errors_and_guidance() {
        let prompt = format!(
            "{}# EXECUTION_LOG_ISSUE\nPhase GREEN status: IN_PROGRESS\n",
            complete_prompt()
        );
        let r = validator().validate_prompt(&prompt);
        assert!(r
            .errors
            .contains(&"INVALID: Phase log has 1 phases, expected 5 phases from schema".to_string()));
        assert!(r.errors.contains(
            &"INCOMPLETE: Missing required phases: COMMIT, PREPARE, RED_ACCEPTANCE, RED_UNIT"
                .to_string()
        ));
        assert!(r
            .recovery_guidance
            .contains(&"FIX: Complete or rollback the IN_PROGRESS phase GREEN".to_string()));
    }
}
