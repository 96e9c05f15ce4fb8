use crate::output::print_json;
use anyhow::Context;
use des_core::log_phase::{log_phase, PhaseRecord};
use des_core::schema::TddSchema;
use std::path::Path;

pub fn run(root: &Path, project_dir: &Path, record: PhaseRecord<'_>, json: bool) -> anyhow::Result<()> {
    let schema = TddSchema::load(root).context("failed to load TDD schema")?;
    let event = log_phase(project_dir, &schema, &record, chrono::Utc::now())?;
    tracing::debug!(step_id = record.step_id, phase = record.phase, "phase logged");
    if json {
        return print_json(&event);
    }
    println!("{event}");
    Ok(())
}
