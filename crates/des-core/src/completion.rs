//! Has a step recorded a complete TDD cycle?

use crate::phase_event::PhaseEvent;
use crate::schema::{SkipPrefix, TddSchema};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorType {
    /// No events at all for the step.
    SilentCompletion,
    AbandonedPhase,
    IncompletePhase,
    InvalidSkip,
    MultipleErrors,
}

impl fmt::Display for CompletionErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionErrorType::SilentCompletion => "SILENT_COMPLETION",
            CompletionErrorType::AbandonedPhase => "ABANDONED_PHASE",
            CompletionErrorType::IncompletePhase => "INCOMPLETE_PHASE",
            CompletionErrorType::InvalidSkip => "INVALID_SKIP",
            CompletionErrorType::MultipleErrors => "MULTIPLE_ERRORS",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResult {
    pub missing_phases: Vec<String>,
    pub incomplete_phases: Vec<String>,
    pub invalid_skips: Vec<String>,
    pub error_messages: Vec<String>,
    pub recovery_suggestions: Vec<String>,
    pub error_type: Option<CompletionErrorType>,
}

impl CompletionResult {
    pub fn is_valid(&self) -> bool {
        self.error_type.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct StepCompletionValidator<'a> {
    schema: &'a TddSchema,
}

impl<'a> StepCompletionValidator<'a> {
    pub fn new(schema: &'a TddSchema) -> Self {
        Self { schema }
    }

    /// `events` must already be filtered to one step. When a phase is
    /// recorded more than once, the last record wins.
    pub fn validate(&self, events: &[PhaseEvent]) -> CompletionResult {
        let all_phases = self.schema.tdd_phases.join(", ");
        if events.is_empty() {
            return CompletionResult {
                missing_phases: self.schema.tdd_phases.clone(),
                error_messages: vec![
                    "Agent completed without updating step file".to_string(),
                    format!("Missing phases: {all_phases}"),
                ],
                recovery_suggestions: vec![
                    "Check agent transcript for errors that prevented execution".to_string(),
                    "Verify agent received correct step context and instructions".to_string(),
                    format!("Resume execution to complete missing phases: {all_phases}"),
                ],
                error_type: Some(CompletionErrorType::SilentCompletion),
                ..Default::default()
            };
        }

        let latest: HashMap<&str, &PhaseEvent> = events
            .iter()
            .map(|ev| (ev.phase_name.as_str(), ev))
            .collect();

        let mut r = CompletionResult::default();
        for phase in &self.schema.tdd_phases {
            match latest.get(phase.as_str()) {
                None => r.missing_phases.push(phase.clone()),
                Some(ev) => self.check_event(phase, ev, &mut r),
            }
        }

        if !r.missing_phases.is_empty() {
            let missing = r.missing_phases.join(", ");
            r.error_messages.push(format!("Missing phases: {missing}"));
            r.recovery_suggestions.extend([
                format!("Resume execution to complete missing phases: {missing}"),
                "Format: step_id|phase|status|data|timestamp".to_string(),
            ]);
        }
        if r.error_messages.is_empty() {
            return r;
        }
        r.recovery_suggestions.extend(
            [
                "Fix invalid phase entries in execution-log.yaml",
                "Ensure EXECUTED phases have PASS/FAIL outcome",
                "Ensure SKIPPED phases have valid reason prefix",
            ]
            .map(String::from),
        );
        r.error_type = Some(classify(&r));
        r
    }

    fn check_event(&self, phase: &str, ev: &PhaseEvent, r: &mut CompletionResult) {
        let outcome = ev.outcome.as_str();
        match ev.status.as_str() {
            "EXECUTED" => {
                if outcome != "PASS" && outcome != "FAIL" {
                    r.incomplete_phases.push(phase.to_string());
                    r.error_messages.push(format!(
                        "{phase}: Invalid outcome '{outcome}' (must be PASS or FAIL)"
                    ));
                } else if self.schema.is_terminal(phase) && outcome != "PASS" {
                    r.incomplete_phases.push(phase.to_string());
                    r.error_messages.push(format!(
                        "{phase}: Terminal phase must have outcome PASS (not FAIL)"
                    ));
                }
            }
            "SKIPPED" => match self.schema.skip_prefix_kind(outcome) {
                SkipPrefix::Valid => {}
                SkipPrefix::Blocking => {
                    r.invalid_skips.push(phase.to_string());
                    r.error_messages.push(format!(
                        "{phase}: Invalid skip reason '{outcome}' (must start with: {})",
                        self.schema.valid_skip_prefixes.join(", ")
                    ));
                    r.error_messages.push(format!(
                        "{phase}: Skip reason '{outcome}' blocks commit (DEFERRED not allowed)"
                    ));
                }
                SkipPrefix::Invalid => {
                    r.invalid_skips.push(phase.to_string());
                    r.error_messages.push(format!(
                        "{phase}: Invalid skip reason '{outcome}' (must start with: {})",
                        self.schema.valid_skip_prefixes.join(", ")
                    ));
                }
            },
            status if !self.schema.valid_statuses.iter().any(|s| s == status) => {
                r.error_messages.push(format!(
                    "{phase}: Invalid status '{status}' (must be: {})",
                    self.schema.valid_statuses.join(", ")
                ));
            }
            _ => {}
        }
    }
}

fn classify(r: &CompletionResult) -> CompletionErrorType {
    match (
        !r.missing_phases.is_empty(),
        !r.incomplete_phases.is_empty(),
        !r.invalid_skips.is_empty(),
    ) {
        (true, false, false) => CompletionErrorType::AbandonedPhase,
        (false, true, false) => CompletionErrorType::IncompletePhase,
        (false, false, true) => CompletionErrorType::InvalidSkip,
        _ => CompletionErrorType::MultipleErrors,
    }
}
