//! Agent-facing phase recording: validate one phase outcome and append it to
//! `<project-dir>/execution-log.yaml` with a real UTC timestamp.

use crate::clock::log_timestamp;
use crate::error::{DesError, Result};
use crate::execution_log::append_event;
use crate::paths;
use crate::phase_event::PhaseEvent;
use crate::schema::{SkipPrefix, TddSchema};
use chrono::{DateTime, Utc};
use std::path::Path;

pub const RECORDABLE_STATUSES: &[&str] = &["EXECUTED", "SKIPPED"];

#[derive(Debug, Clone)]
pub struct PhaseRecord<'a> {
    pub step_id: &'a str,
    pub phase: &'a str,
    pub status: &'a str,
    pub data: &'a str,
    pub turns_used: Option<u64>,
    pub tokens_used: Option<u64>,
}

/// Check `record` against the schema and build the event to append.
pub fn build_event(schema: &TddSchema, record: &PhaseRecord<'_>, now: DateTime<Utc>) -> Result<PhaseEvent> {
    if !schema.is_valid_phase(record.phase) {
        return Err(DesError::UnknownPhase {
            phase: record.phase.to_string(),
            valid: schema.tdd_phases.join(", "),
        });
    }
    if !RECORDABLE_STATUSES.contains(&record.status) {
        return Err(DesError::InvalidStatus(record.status.to_string()));
    }
    // Blocking prefixes are recordable; completion validation rejects them later.
    if record.status == "SKIPPED" && schema.skip_prefix_kind(record.data) == SkipPrefix::Invalid {
        return Err(DesError::InvalidSkipReason(record.data.to_string()));
    }
    Ok(PhaseEvent::new(
        record.step_id,
        record.phase,
        record.status,
        record.data,
        log_timestamp(now),
    )
    .with_stats(record.turns_used, record.tokens_used))
}

/// Append one validated phase entry. The execution log must already exist.
pub fn log_phase(
    project_dir: &Path,
    schema: &TddSchema,
    record: &PhaseRecord<'_>,
    now: DateTime<Utc>,
) -> Result<PhaseEvent> {
    let event = build_event(schema, record, now)?;
    let path = project_dir.join(paths::EXECUTION_LOG_FILE);
    if !path.exists() {
        return Err(DesError::LogNotFound(path.display().to_string()));
    }
    append_event(&path, &event)?;
    Ok(event)
}
