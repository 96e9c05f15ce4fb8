use super::Exit;
use crate::output::{print_json, print_table};
use anyhow::Context;
use des_core::deliver::{verify_project_dir, DeliverCheck};
use des_core::roadmap::RoadmapSchema;
use des_core::schema::TddSchema;
use des_core::DesError;
use serde_json::json;
use std::path::Path;

pub fn run(root: &Path, project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let tdd = TddSchema::load(root).context("failed to load TDD schema")?;
    let roadmap_schema = RoadmapSchema::load(root).context("failed to load roadmap schema")?;

    let check = match verify_project_dir(project_dir, &tdd, &roadmap_schema) {
        Ok(c) => c,
        Err(DesError::RoadmapNotFound(p)) => {
            eprintln!("Error: roadmap.yaml not found at {p}");
            return Err(Exit(2).into());
        }
        Err(DesError::LogNotFound(p)) => {
            eprintln!("Error: execution-log.yaml not found at {p}");
            return Err(Exit(2).into());
        }
        Err(e @ (DesError::InvalidRoadmap(_) | DesError::LogCorrupted(_))) => {
            eprintln!("Error: {e}");
            return Err(Exit(2).into());
        }
        Err(e) => return Err(e.into()),
    };

    match check {
        DeliverCheck::RoadmapErrors(errors) => {
            if json {
                print_json(&json!({
                    "valid": false,
                    "roadmap_errors": errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
                }))?;
            } else {
                println!("ROADMAP FORMAT ERRORS ({}):", errors.len());
                for e in &errors {
                    println!("  - {e}");
                }
                println!("Fix roadmap format before verifying deliver integrity.");
            }
            Err(Exit(1).into())
        }
        DeliverCheck::Checked(result) => {
            if json {
                let violations: Vec<_> = result
                    .violations
                    .iter()
                    .map(|v| {
                        json!({
                            "step_id": v.step_id,
                            "has_execution_log": v.has_execution_log,
                            "phase_count": v.phase_count,
                            "missing_phases": v.missing_phases,
                        })
                    })
                    .collect();
                print_json(&json!({
                    "valid": result.is_valid(),
                    "steps_verified": result.steps_verified,
                    "expected_phases": result.expected_phases,
                    "reason": result.reason(),
                    "violations": violations,
                }))?;
            } else if let Some(reason) = result.reason() {
                println!("INTEGRITY VIOLATIONS: {reason}");
                let rows = result
                    .violations
                    .iter()
                    .map(|v| {
                        vec![
                            v.step_id.clone(),
                            format!("{}/{}", v.phase_count, result.expected_phases),
                            v.missing_phases.join(", "),
                        ]
                    })
                    .collect();
                print_table(&["STEP", "PHASES", "MISSING"], rows);
            } else {
                println!(
                    "All {} steps have complete DES traces",
                    result.steps_verified
                );
            }
            if result.is_valid() {
                Ok(())
            } else {
                Err(Exit(1).into())
            }
        }
    }
}
