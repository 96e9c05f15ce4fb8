//! Pre-finalize check that every roadmap step went through a DES-monitored
//! TDD cycle.

use crate::error::Result;
use crate::execution_log::ExecutionLog;
use crate::paths;
use crate::roadmap::{self, RoadmapSchema, RoadmapValidator, Violation};
use crate::schema::TddSchema;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepIntegrity {
    pub step_id: String,
    /// Whether any execution-log entry names this step.
    pub has_execution_log: bool,
    pub phase_count: usize,
    pub missing_phases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverIntegrity {
    pub steps_verified: usize,
    pub expected_phases: usize,
    pub violations: Vec<StepIntegrity>,
}

impl DeliverIntegrity {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// One-line summary split into untraced and partially traced steps.
    pub fn reason(&self) -> Option<String> {
        if self.is_valid() {
            return None;
        }
        let (untraced, partial): (Vec<&StepIntegrity>, Vec<&StepIntegrity>) =
            self.violations.iter().partition(|v| !v.has_execution_log);
        let mut parts = Vec::new();
        if !untraced.is_empty() {
            let ids: Vec<&str> = untraced.iter().map(|v| v.step_id.as_str()).collect();
            parts.push(format!(
                "{} step(s) have NO execution-log entries (likely implemented without DES): {}",
                untraced.len(),
                ids.join(", ")
            ));
        }
        if !partial.is_empty() {
            let ids: Vec<String> = partial
                .iter()
                .map(|v| format!("{} ({}/{})", v.step_id, v.phase_count, self.expected_phases))
                .collect();
            parts.push(format!(
                "{} step(s) have incomplete TDD phases: {}",
                partial.len(),
                ids.join(", ")
            ));
        }
        Some(parts.join("; "))
    }
}

pub struct DeliverIntegrityVerifier<'a> {
    required_phases: &'a [String],
}

impl<'a> DeliverIntegrityVerifier<'a> {
    pub fn new(required_phases: &'a [String]) -> Self {
        Self { required_phases }
    }

    /// `recorded` maps step id to the phase names logged for it.
    pub fn verify(&self, steps: &[String], recorded: &HashMap<String, Vec<String>>) -> DeliverIntegrity {
        let violations = steps
            .iter()
            .filter_map(|step_id| {
                let phases = recorded.get(step_id).map(Vec::as_slice).unwrap_or(&[]);
                let missing: Vec<String> = self
                    .required_phases
                    .iter()
                    .filter(|p| !phases.contains(*p))
                    .cloned()
                    .collect();
                (!missing.is_empty()).then(|| StepIntegrity {
                    step_id: step_id.clone(),
                    has_execution_log: !phases.is_empty(),
                    phase_count: phases.len(),
                    missing_phases: missing,
                })
            })
            .collect();
        DeliverIntegrity {
            steps_verified: steps.len(),
            expected_phases: self.required_phases.len(),
            violations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliverCheck {
    /// The roadmap must be fixed before traces can be checked.
    RoadmapErrors(Vec<Violation>),
    Checked(DeliverIntegrity),
}

/// Cross-check `<dir>/roadmap.yaml` against `<dir>/execution-log.yaml`.
pub fn verify_project_dir(dir: &Path, tdd: &TddSchema, roadmap_schema: &RoadmapSchema) -> Result<DeliverCheck> {
    let roadmap = roadmap::load(&dir.join(paths::ROADMAP_FILE))?;
    let log = ExecutionLog::load(&dir.join(paths::EXECUTION_LOG_FILE))?;

    let validation = RoadmapValidator::new(roadmap_schema)?.validate(&roadmap);
    if !validation.is_valid() {
        return Ok(DeliverCheck::RoadmapErrors(validation.errors().cloned().collect()));
    }

    let steps = roadmap::step_ids(&roadmap);
    let integrity = DeliverIntegrityVerifier::new(&tdd.tdd_phases).verify(&steps, &log.phases_by_step());
    Ok(DeliverCheck::Checked(integrity))
}
