//! Tamper checks on the execution log.
//!
//! Warn-only: nothing here blocks a step. Timestamps that are clearly
//! fabricated (in the future, or well before the task started) are reported
//! as correctable and get rewritten with interpolated real times.

use crate::clock;
use crate::schema::TddSchema;
use crate::phase_event::PhaseEvent;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Clock skew tolerated before a pre-task timestamp counts as fabricated.
const TOLERANCE_SECS: i64 = 60;
const SUGGESTION_CUTOFF: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionReason {
    Future,
    PreTask,
}

impl CorrectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionReason::Future => "future",
            CorrectionReason::PreTask => "pre_task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectableEntry {
    /// Index into the log's raw `events` sequence.
    pub index: usize,
    pub step_id: String,
    pub phase_name: String,
    pub original_timestamp: String,
    pub reason: CorrectionReason,
}

impl CorrectableEntry {
    /// Warning text used when the entry could not be rewritten.
    pub fn warning(&self) -> String {
        let kind = match self.reason {
            CorrectionReason::Future => "Future",
            CorrectionReason::PreTask => "Pre-task",
        };
        format!("{kind} timestamp on {}: {}", self.phase_name, self.original_timestamp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityResult {
    /// Issues that were not corrected automatically.
    pub warnings: Vec<String>,
    pub correctable: Vec<CorrectableEntry>,
}

pub struct LogIntegrityValidator<'a> {
    schema: &'a TddSchema,
    now: DateTime<Utc>,
}

impl<'a> LogIntegrityValidator<'a> {
    pub fn new(schema: &'a TddSchema, now: DateTime<Utc>) -> Self {
        Self { schema, now }
    }

    /// `events` are all parseable log entries paired with their raw index.
    pub fn validate(
        &self,
        step_id: &str,
        events: &[(usize, PhaseEvent)],
        task_start: Option<DateTime<Utc>>,
    ) -> IntegrityResult {
        let mut result = IntegrityResult::default();
        self.check_phase_names(step_id, events, &mut result);
        check_foreign_steps(step_id, events, task_start, &mut result);
        self.check_timestamps(step_id, events, task_start, &mut result);
        result
    }

    fn check_phase_names(
        &self,
        step_id: &str,
        events: &[(usize, PhaseEvent)],
        result: &mut IntegrityResult,
    ) {
        for (_, ev) in events.iter().filter(|(_, e)| e.step_id == step_id) {
            if self.schema.is_valid_phase(&ev.phase_name) {
                continue;
            }
            let hint = closest_phase(&ev.phase_name, &self.schema.tdd_phases)
                .map(|m| format!(" (did you mean '{m}'?)"))
                .unwrap_or_default();
            result
                .warnings
                .push(format!("Unrecognized phase name '{}'{hint}", ev.phase_name));
        }
    }

    fn check_timestamps(
        &self,
        step_id: &str,
        events: &[(usize, PhaseEvent)],
        task_start: Option<DateTime<Utc>>,
        result: &mut IntegrityResult,
    ) {
        let tolerance = Duration::seconds(TOLERANCE_SECS);
        for (index, ev) in events.iter().filter(|(_, e)| e.step_id == step_id) {
            let Some(at) = clock::parse_timestamp(&ev.timestamp) else {
                continue;
            };
            let reason = if at > self.now {
                Some(CorrectionReason::Future)
            } else if task_start.is_some_and(|start| at < start - tolerance) {
                Some(CorrectionReason::PreTask)
            } else {
                if task_start.is_some_and(|start| at < start) {
                    result.warnings.push(format!(
                        "Pre-task timestamp on {}: {}",
                        ev.phase_name, ev.timestamp
                    ));
                }
                None
            };
            if let Some(reason) = reason {
                result.correctable.push(CorrectableEntry {
                    index: *index,
                    step_id: ev.step_id.clone(),
                    phase_name: ev.phase_name.clone(),
                    original_timestamp: ev.timestamp.clone(),
                    reason,
                });
            }
        }
    }
}

fn check_foreign_steps(
    step_id: &str,
    events: &[(usize, PhaseEvent)],
    task_start: Option<DateTime<Utc>>,
    result: &mut IntegrityResult,
) {
    let Some(start) = task_start else {
        return;
    };
    let foreign: BTreeSet<&str> = events
        .iter()
        .map(|(_, e)| e)
        .filter(|e| e.step_id != step_id)
        .filter(|e| clock::parse_timestamp(&e.timestamp).is_some_and(|at| at >= start))
        .map(|e| e.step_id.as_str())
        .collect();
    for id in foreign {
        result
            .warnings
            .push(format!("Foreign step_id '{id}' has events written during task window"));
    }
}

fn closest_phase<'p>(name: &str, phases: &'p [String]) -> Option<&'p str> {
    phases
        .iter()
        .map(|p| (p, strsim::normalized_levenshtein(name, p)))
        .filter(|(_, score)| *score >= SUGGESTION_CUTOFF)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(p, _)| p.as_str())
}

/// Spread `n` replacement timestamps evenly across `start..now`. A single
/// entry lands on the midpoint.
pub fn interpolate(start: DateTime<Utc>, now: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
    if n == 0 {
        return Vec::new();
    }
    let span = now - start;
    let step = span / (n as i32 + 1);
    (1..=n as i32).map(|i| start + step * i).collect()
}

impl std::fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
